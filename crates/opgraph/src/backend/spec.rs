use std::{fmt, fs, io, path::Path, sync::Arc};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::element::Element;

/// IR version enforced when loading serialized programs.
pub const SPEC_VERSION: &str = "opir.v1";

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

/// Scalar element types understood by the backend contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si16,
    Ui16,
    Si32,
    Ui32,
    Si64,
    Ui64,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 11] = [
        DType::I1,
        DType::Si8,
        DType::Ui8,
        DType::Si16,
        DType::Ui16,
        DType::Si32,
        DType::Ui32,
        DType::Si64,
        DType::Ui64,
        DType::F32,
        DType::F64,
    ];

    /// Returns `true` for every signed or unsigned fixed-width integer.
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(self, DType::Si8 | DType::Si16 | DType::Si32 | DType::Si64)
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DType::Ui8 | DType::Ui16 | DType::Ui32 | DType::Ui64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Booleans are storage-only; arithmetic ops reject them.
    pub fn is_numeric(self) -> bool {
        self != DType::I1
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I1 | DType::Si8 | DType::Ui8 => 1,
            DType::Si16 | DType::Ui16 => 2,
            DType::Si32 | DType::Ui32 | DType::F32 => 4,
            DType::Si64 | DType::Ui64 | DType::F64 => 8,
        }
    }

    /// Short lowercase name used in diagnostics and the text IR (`f32`, `si64`, ...).
    pub fn short_name(self) -> &'static str {
        match self {
            DType::I1 => "i1",
            DType::Si8 => "si8",
            DType::Ui8 => "ui8",
            DType::Si16 => "si16",
            DType::Ui16 => "ui16",
            DType::Si32 => "si32",
            DType::Ui32 => "ui32",
            DType::Si64 => "si64",
            DType::Ui64 => "ui64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Logical tensor shape. An empty dimension list denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn into_dims(self) -> Vec<usize> {
        self.dims
    }

    /// Total element count, `None` on overflow. Scalars hold one element.
    pub fn element_count(&self) -> Option<usize> {
        let mut count = 1usize;
        for dim in &self.dims {
            count = count.checked_mul(*dim)?;
        }
        Some(count)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        let dims = self
            .dims
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join("x");
        f.write_str(&dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn element_count(&self) -> Option<usize> {
        self.shape.element_count()
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size_in_bytes())
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{} x {}>", self.dtype, self.shape)
    }
}

/// Dense literal tensor payload stored little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    /// Encodes typed values, checking dtype and element count against `shape`.
    pub fn from_values<T: Element>(shape: Shape, values: &[T]) -> BackendResult<Self> {
        let spec = TensorSpec::new(T::DTYPE, shape);
        let expected = spec.element_count().ok_or_else(|| {
            BackendError::spec(
                SpecErrorCode::ElementCountOverflow,
                format!("shape {}", spec.shape),
            )
        })?;
        if values.len() != expected {
            return Err(BackendError::spec(
                SpecErrorCode::LiteralLengthMismatch,
                format!(
                    "{} values supplied for shape {} ({} elements)",
                    values.len(),
                    spec.shape,
                    expected
                ),
            ));
        }
        let mut bytes = Vec::with_capacity(expected * T::DTYPE.size_in_bytes());
        for value in values {
            value.write_le(&mut bytes);
        }
        Ok(Self::new(spec, Arc::from(bytes.into_boxed_slice())))
    }

    /// Zero-filled literal for `spec`.
    pub fn zeroed(spec: TensorSpec) -> BackendResult<Self> {
        let byte_len = spec.byte_len().ok_or_else(|| {
            BackendError::spec(
                SpecErrorCode::ElementCountOverflow,
                format!("shape {}", spec.shape),
            )
        })?;
        Ok(Self::new(spec, Arc::from(vec![0u8; byte_len])))
    }

    /// Decodes the payload as `T`, rejecting a dtype mismatch or a truncated buffer.
    pub fn to_values<T: Element>(&self) -> BackendResult<Vec<T>> {
        if self.spec.dtype != T::DTYPE {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeMismatch,
                format!(
                    "literal holds {} but {} was requested",
                    self.spec.dtype,
                    T::DTYPE
                ),
            ));
        }
        let width = T::DTYPE.size_in_bytes();
        if Some(self.bytes.len()) != self.spec.byte_len() {
            return Err(BackendError::execution(format!(
                "literal byte length {} does not match {}",
                self.bytes.len(),
                self.spec
            )));
        }
        Ok(self.bytes.chunks_exact(width).map(T::read_le).collect())
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("spec", &self.spec)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            spec: TensorSpec,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            spec: helper.spec,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

/// Initialization payload when materialising tensors on a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TensorInit {
    Literal(TensorLiteral),
    Zeroed(TensorSpec),
}

impl TensorInit {
    pub fn spec(&self) -> &TensorSpec {
        match self {
            TensorInit::Literal(literal) => &literal.spec,
            TensorInit::Zeroed(spec) => spec,
        }
    }
}

/// Elementwise unary ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementwiseUnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
}

impl ElementwiseUnaryOp {
    /// Ops that are only defined on floating-point inputs.
    pub fn requires_float(self) -> bool {
        !matches!(self, ElementwiseUnaryOp::Neg | ElementwiseUnaryOp::Abs)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementwiseUnaryOp::Neg => "neg",
            ElementwiseUnaryOp::Abs => "abs",
            ElementwiseUnaryOp::Exp => "exp",
            ElementwiseUnaryOp::Log => "log",
            ElementwiseUnaryOp::Sqrt => "sqrt",
            ElementwiseUnaryOp::Sin => "sin",
            ElementwiseUnaryOp::Cos => "cos",
            ElementwiseUnaryOp::Tan => "tan",
            ElementwiseUnaryOp::Sinh => "sinh",
            ElementwiseUnaryOp::Cosh => "cosh",
            ElementwiseUnaryOp::Tanh => "tanh",
        }
    }
}

/// Elementwise binary ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementwiseBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

impl ElementwiseBinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            ElementwiseBinaryOp::Add => "add",
            ElementwiseBinaryOp::Sub => "sub",
            ElementwiseBinaryOp::Mul => "mul",
            ElementwiseBinaryOp::Div => "div",
            ElementwiseBinaryOp::Maximum => "maximum",
            ElementwiseBinaryOp::Minimum => "minimum",
        }
    }
}

/// Unique identifier for SSA values in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Operand reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Value(ValueId),
    Literal(TensorLiteral),
}

/// Declarative form of IR operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Constant(TensorLiteral),
    ElementwiseUnary(ElementwiseUnaryOp),
    ElementwiseBinary(ElementwiseBinaryOp),
}

impl Operation {
    /// Stable dotted label (`elementwise_unary.cosh`) used in logs and error context.
    pub fn label(&self) -> String {
        match self {
            Operation::Constant(_) => "constant".to_string(),
            Operation::ElementwiseUnary(op) => format!("elementwise_unary.{}", op.name()),
            Operation::ElementwiseBinary(op) => format!("elementwise_binary.{}", op.name()),
        }
    }
}

/// Single SSA instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: ValueId,
    pub op: Operation,
    pub operands: Vec<Operand>,
    pub output: TensorSpec,
}

/// Function describing a computation over typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<TensorSpec>,
    pub parameter_ids: Vec<ValueId>,
    pub results: Vec<TensorSpec>,
    pub body: Vec<Instruction>,
    pub result_ids: Vec<ValueId>,
}

/// Complete program; `entry` names the function backends execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    pub entry: String,
    pub functions: Vec<Function>,
}

#[derive(Debug, Error)]
pub enum ProgramSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("program spec version '{found}' does not match expected '{expected}'")]
    SpecVersionMismatch {
        found: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ProgramIoError {
    #[error(transparent)]
    Serialization(#[from] ProgramSerdeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Program {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            spec_version: SPEC_VERSION.to_string(),
            entry: entry.into(),
            functions: Vec::new(),
        }
    }

    pub fn with_functions(mut self, functions: Vec<Function>) -> Self {
        self.functions = functions;
        self
    }

    pub fn entry_function(&self) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == self.entry)
    }

    pub fn to_json_string(&self) -> Result<String, ProgramSerdeError> {
        serde_json::to_string_pretty(self).map_err(ProgramSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ProgramSerdeError> {
        let mut program: Program = serde_json::from_str(src).map_err(ProgramSerdeError::from)?;
        program.spec_version = normalize_spec_version(program.spec_version)?;
        Ok(program)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ProgramIoError> {
        let contents = self.to_json_string()?;
        fs::write(path, contents).map_err(ProgramIoError::from)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ProgramIoError> {
        let contents = fs::read_to_string(path).map_err(ProgramIoError::from)?;
        Program::from_json_str(&contents).map_err(ProgramIoError::from)
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

fn normalize_spec_version(version: String) -> Result<String, ProgramSerdeError> {
    if version.is_empty() {
        return Ok(SPEC_VERSION.to_string());
    }
    if version == SPEC_VERSION {
        Ok(version)
    } else {
        Err(ProgramSerdeError::SpecVersionMismatch {
            found: version,
            expected: SPEC_VERSION,
        })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(
            f,
            0,
            &format!(
                "program @{} (spec_version = {}) {{",
                self.entry, self.spec_version
            ),
        )?;
        for function in &self.functions {
            fmt_function(function, 1, f)?;
        }
        write_line(f, 0, "}")
    }
}

fn fmt_function(function: &Function, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_line(f, indent, &format!("func @{} {{", function.name))?;
    if !function.parameter_ids.is_empty() {
        write_line(f, indent + 1, "params:")?;
        for (value_id, spec) in function
            .parameter_ids
            .iter()
            .zip(function.parameters.iter())
        {
            write_line(f, indent + 2, &format!("%{} : {}", value_id.0, spec))?;
        }
    }
    if !function.body.is_empty() {
        write_line(f, indent + 1, "body:")?;
        for instruction in &function.body {
            fmt_instruction(instruction, indent + 2, f)?;
        }
    }
    if !function.result_ids.is_empty() {
        write_line(f, indent + 1, "results:")?;
        for (value_id, spec) in function.result_ids.iter().zip(function.results.iter()) {
            write_line(f, indent + 2, &format!("%{} : {}", value_id.0, spec))?;
        }
    }
    write_line(f, indent, "}")
}

fn fmt_instruction(
    instruction: &Instruction,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let operands = instruction
        .operands
        .iter()
        .map(format_operand)
        .collect::<Vec<_>>();
    let label = instruction.op.label();
    let line = if operands.is_empty() {
        format!("%{} = {} -> {}", instruction.id.0, label, instruction.output)
    } else {
        format!(
            "%{} = {}({}) -> {}",
            instruction.id.0,
            label,
            operands.join(", "),
            instruction.output
        )
    };
    write_line(f, indent, &line)
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(id) => format!("%{}", id.0),
        Operand::Literal(lit) => format!(
            "literal(dtype={}, shape={})",
            lit.spec.dtype, lit.spec.shape
        ),
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

/// Lightweight builder for constructing functions programmatically.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    next_value_id: u32,
    parameters: Vec<(ValueId, TensorSpec)>,
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, spec: TensorSpec) -> ValueId {
        let id = self.allocate();
        self.parameters.push((id, spec));
        id
    }

    pub fn emit(&mut self, op: Operation, operands: Vec<Operand>, output: TensorSpec) -> ValueId {
        let id = self.allocate();
        self.instructions.push(Instruction {
            id,
            op,
            operands,
            output,
        });
        id
    }

    pub fn value_spec(&self, id: ValueId) -> Option<&TensorSpec> {
        self.parameters
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, spec)| spec)
            .or_else(|| {
                self.instructions
                    .iter()
                    .find(|inst| inst.id == id)
                    .map(|inst| &inst.output)
            })
    }

    /// Seals the function. Fails when a result id was never produced.
    pub fn finish(self, name: impl Into<String>, result_ids: Vec<ValueId>) -> BackendResult<Function> {
        let mut results = Vec::with_capacity(result_ids.len());
        for id in &result_ids {
            let spec = self.value_spec(*id).cloned().ok_or_else(|| {
                BackendError::spec(
                    SpecErrorCode::UndefinedValue,
                    format!("result %{} has no producer", id.0),
                )
            })?;
            results.push(spec);
        }
        let (parameter_ids, parameters): (Vec<_>, Vec<_>) = self.parameters.into_iter().unzip();
        Ok(Function {
            name: name.into(),
            parameters,
            parameter_ids,
            results,
            body: self.instructions,
            result_ids,
        })
    }

    fn allocate(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }
}

/// Stable set of validation error identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecErrorCode {
    DTypeNotSupported,
    DTypeMismatch,
    ShapeMismatch,
    LiteralLengthMismatch,
    ElementCountOverflow,
    UndefinedValue,
    DuplicateValue,
    EntryFunctionMissing,
    ArityMismatch,
    IntegerDivideByZero,
    Unspecified(&'static str),
}

impl SpecErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecErrorCode::DTypeNotSupported => "SpecError: dtype not supported for op",
            SpecErrorCode::DTypeMismatch => "SpecError: dtype mismatch",
            SpecErrorCode::ShapeMismatch => "SpecError: shape mismatch",
            SpecErrorCode::LiteralLengthMismatch => {
                "SpecError: literal length does not match shape"
            }
            SpecErrorCode::ElementCountOverflow => "SpecError: element count overflows usize",
            SpecErrorCode::UndefinedValue => "SpecError: value used before definition",
            SpecErrorCode::DuplicateValue => "SpecError: value defined twice",
            SpecErrorCode::EntryFunctionMissing => "SpecError: entry function not found",
            SpecErrorCode::ArityMismatch => "SpecError: operand count mismatch",
            SpecErrorCode::IntegerDivideByZero => "SpecError: integer divide by zero",
            SpecErrorCode::Unspecified(code) => code,
        }
    }
}

/// Validation failure captured before or during execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecError {
    pub code: SpecErrorCode,
    pub detail: Option<String>,
}

impl SpecError {
    pub fn new(code: SpecErrorCode, detail: impl Into<Option<String>>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.code.as_str()),
            None => write!(f, "{}", self.code.as_str()),
        }
    }
}

impl std::error::Error for SpecError {}

/// Backend error surfaced to higher layers.
#[derive(Debug)]
pub enum BackendError {
    SpecViolation(SpecError),
    Unimplemented { op: &'static str, reason: String },
    Execution { message: String },
}

impl BackendError {
    pub fn spec(code: SpecErrorCode, detail: impl Into<Option<String>>) -> Self {
        BackendError::SpecViolation(SpecError::new(code, detail))
    }

    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    /// Returns the spec code when this is a validation failure.
    pub fn spec_code(&self) -> Option<&SpecErrorCode> {
        match self {
            BackendError::SpecViolation(err) => Some(&err.code),
            _ => None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::SpecViolation(err) => write!(f, "{err}"),
            BackendError::Unimplemented { op, reason } => {
                write!(f, "{op} is not implemented: {reason}")
            }
            BackendError::Execution { message } => {
                write!(f, "backend execution failure: {message}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// Structural type check run before a program reaches a backend.
///
/// Confirms the entry function exists, every operand is defined before use, ids are unique,
/// and each elementwise instruction's operands agree with its declared output.
pub fn validate_program(program: &Program) -> BackendResult<()> {
    let function = program.entry_function().ok_or_else(|| {
        BackendError::spec(
            SpecErrorCode::EntryFunctionMissing,
            format!("@{}", program.entry),
        )
    })?;
    if function.parameter_ids.len() != function.parameters.len()
        || function.result_ids.len() != function.results.len()
    {
        return Err(BackendError::spec(
            SpecErrorCode::ArityMismatch,
            format!("function @{} signature lists disagree", function.name),
        ));
    }

    let mut defined: std::collections::HashMap<ValueId, &TensorSpec> =
        std::collections::HashMap::new();
    for (id, spec) in function.parameter_ids.iter().zip(&function.parameters) {
        if defined.insert(*id, spec).is_some() {
            return Err(BackendError::spec(
                SpecErrorCode::DuplicateValue,
                format!("parameter %{}", id.0),
            ));
        }
    }

    for instruction in &function.body {
        let mut operand_specs = Vec::with_capacity(instruction.operands.len());
        for operand in &instruction.operands {
            let spec = match operand {
                Operand::Value(id) => *defined.get(id).ok_or_else(|| {
                    BackendError::spec(
                        SpecErrorCode::UndefinedValue,
                        format!("%{} used by %{}", id.0, instruction.id.0),
                    )
                })?,
                Operand::Literal(lit) => &lit.spec,
            };
            operand_specs.push(spec);
        }
        validate_instruction(instruction, &operand_specs)?;
        if defined.insert(instruction.id, &instruction.output).is_some() {
            return Err(BackendError::spec(
                SpecErrorCode::DuplicateValue,
                format!("instruction %{}", instruction.id.0),
            ));
        }
    }

    for (id, spec) in function.result_ids.iter().zip(&function.results) {
        let produced = defined.get(id).ok_or_else(|| {
            BackendError::spec(SpecErrorCode::UndefinedValue, format!("result %{}", id.0))
        })?;
        if *produced != spec {
            return Err(BackendError::spec(
                SpecErrorCode::ShapeMismatch,
                format!("result %{} declared {} but produces {}", id.0, spec, produced),
            ));
        }
    }
    Ok(())
}

fn validate_instruction(instruction: &Instruction, operands: &[&TensorSpec]) -> BackendResult<()> {
    let output = &instruction.output;
    let expect_arity = |count: usize| -> BackendResult<()> {
        if operands.len() == count {
            Ok(())
        } else {
            Err(BackendError::spec(
                SpecErrorCode::ArityMismatch,
                format!(
                    "%{} {} expects {count} operands, found {}",
                    instruction.id.0,
                    instruction.op.label(),
                    operands.len()
                ),
            ))
        }
    };
    let expect_same = |spec: &TensorSpec| -> BackendResult<()> {
        if spec.dtype != output.dtype {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeMismatch,
                format!("%{}: operand {} vs output {}", instruction.id.0, spec, output),
            ));
        }
        if spec.shape != output.shape {
            return Err(BackendError::spec(
                SpecErrorCode::ShapeMismatch,
                format!("%{}: operand {} vs output {}", instruction.id.0, spec, output),
            ));
        }
        Ok(())
    };

    match &instruction.op {
        Operation::Constant(literal) => {
            expect_arity(0)?;
            expect_same(&literal.spec)?;
            if Some(literal.byte_len()) != literal.spec.byte_len() {
                return Err(BackendError::spec(
                    SpecErrorCode::LiteralLengthMismatch,
                    format!("constant %{}", instruction.id.0),
                ));
            }
        }
        Operation::ElementwiseUnary(op) => {
            expect_arity(1)?;
            expect_same(operands[0])?;
            let dtype = output.dtype;
            let supported = if op.requires_float() {
                dtype.is_float()
            } else {
                dtype.is_float() || dtype.is_signed_integer()
            };
            if !supported {
                return Err(BackendError::spec(
                    SpecErrorCode::DTypeNotSupported,
                    format!("{} on {}", instruction.op.label(), dtype),
                ));
            }
        }
        Operation::ElementwiseBinary(_) => {
            expect_arity(2)?;
            expect_same(operands[0])?;
            expect_same(operands[1])?;
            if !output.dtype.is_numeric() {
                return Err(BackendError::spec(
                    SpecErrorCode::DTypeNotSupported,
                    format!("{} on {}", instruction.op.label(), output.dtype),
                ));
            }
        }
    }
    Ok(())
}

/// Portable backend trait that evaluates programs.
pub trait PortableBackend: Send + Sync {
    type TensorHandle: Clone + Send + Sync + 'static;

    /// Returns a human-readable backend identifier (e.g., `"interpreter"`).
    fn backend_name(&self) -> &str;

    /// Reports whether tensors of `dtype` can be materialised and computed on.
    fn supports_dtype(&self, _dtype: DType) -> bool {
        true
    }

    /// Materialises a tensor handle from host initialisation data.
    fn materialize(&self, init: TensorInit) -> BackendResult<Self::TensorHandle>;

    /// Reads back a tensor handle into a dense literal.
    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral>;

    /// Executes a single instruction given already materialised operand handles.
    fn execute_instruction(
        &self,
        instruction: &Instruction,
        inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>>;

    /// Executes the program's entry function.
    fn run_program(
        &self,
        program: &Program,
        entry_inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>>;
}
