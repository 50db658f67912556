use std::collections::HashMap;
use std::sync::Arc;

use opgraph::backend::shape_helpers::{element_count, ensure_same_spec};
use opgraph::backend::spec::{
    BackendError, BackendResult, DType, Instruction, Operand, Operation, PortableBackend, Program,
    SpecErrorCode, TensorInit, TensorLiteral, TensorSpec, ValueId,
};
use opgraph::runtime::element::Element;

use crate::kernels;

/// Host tensor owned by the interpreter.
#[derive(Clone, Debug)]
pub struct CpuTensor {
    pub spec: TensorSpec,
    pub data: TensorData,
}

/// Typed element storage, one variant per dtype.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    Bool(Arc<[u8]>),
    Si8(Arc<[i8]>),
    Ui8(Arc<[u8]>),
    Si16(Arc<[i16]>),
    Ui16(Arc<[u16]>),
    Si32(Arc<[i32]>),
    Ui32(Arc<[u32]>),
    Si64(Arc<[i64]>),
    Ui64(Arc<[u64]>),
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Bool(_) => DType::I1,
            TensorData::Si8(_) => DType::Si8,
            TensorData::Ui8(_) => DType::Ui8,
            TensorData::Si16(_) => DType::Si16,
            TensorData::Ui16(_) => DType::Ui16,
            TensorData::Si32(_) => DType::Si32,
            TensorData::Ui32(_) => DType::Ui32,
            TensorData::Si64(_) => DType::Si64,
            TensorData::Ui64(_) => DType::Ui64,
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) | TensorData::Ui8(v) => v.len(),
            TensorData::Si8(v) => v.len(),
            TensorData::Si16(v) => v.len(),
            TensorData::Ui16(v) => v.len(),
            TensorData::Si32(v) => v.len(),
            TensorData::Ui32(v) => v.len(),
            TensorData::Si64(v) => v.len(),
            TensorData::Ui64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CpuTensor {
    pub fn from_literal(literal: &TensorLiteral) -> BackendResult<Self> {
        fn decode<T: Element>(literal: &TensorLiteral) -> BackendResult<Arc<[T]>> {
            literal.to_values::<T>().map(Arc::from)
        }

        let data = match literal.spec.dtype {
            DType::I1 => {
                let expected = element_count(&literal.spec.shape)?;
                if literal.bytes.len() != expected {
                    return Err(BackendError::spec(
                        SpecErrorCode::LiteralLengthMismatch,
                        format!("{} bytes for {}", literal.bytes.len(), literal.spec),
                    ));
                }
                TensorData::Bool(Arc::clone(&literal.bytes))
            }
            DType::Si8 => TensorData::Si8(decode(literal)?),
            DType::Ui8 => TensorData::Ui8(decode(literal)?),
            DType::Si16 => TensorData::Si16(decode(literal)?),
            DType::Ui16 => TensorData::Ui16(decode(literal)?),
            DType::Si32 => TensorData::Si32(decode(literal)?),
            DType::Ui32 => TensorData::Ui32(decode(literal)?),
            DType::Si64 => TensorData::Si64(decode(literal)?),
            DType::Ui64 => TensorData::Ui64(decode(literal)?),
            DType::F32 => TensorData::F32(decode(literal)?),
            DType::F64 => TensorData::F64(decode(literal)?),
        };
        Ok(CpuTensor {
            spec: literal.spec.clone(),
            data,
        })
    }

    pub fn zeroed(spec: &TensorSpec) -> BackendResult<Self> {
        let literal = TensorLiteral::zeroed(spec.clone())?;
        Self::from_literal(&literal)
    }

    pub fn to_literal(&self) -> TensorLiteral {
        fn encode<T: Element>(values: &[T]) -> Arc<[u8]> {
            let mut bytes = Vec::with_capacity(values.len() * T::DTYPE.size_in_bytes());
            for value in values {
                value.write_le(&mut bytes);
            }
            Arc::from(bytes.into_boxed_slice())
        }

        let bytes = match &self.data {
            TensorData::Bool(values) => Arc::clone(values),
            TensorData::Si8(values) => encode(values),
            TensorData::Ui8(values) => encode(values),
            TensorData::Si16(values) => encode(values),
            TensorData::Ui16(values) => encode(values),
            TensorData::Si32(values) => encode(values),
            TensorData::Ui32(values) => encode(values),
            TensorData::Si64(values) => encode(values),
            TensorData::Ui64(values) => encode(values),
            TensorData::F32(values) => encode(values),
            TensorData::F64(values) => encode(values),
        };
        TensorLiteral::new(self.spec.clone(), bytes)
    }
}

/// Hook that lets derived backends replace individual kernels.
///
/// Returning `None` falls through to the built-in implementation.
pub trait CpuKernelInterceptor: Send + Sync {
    fn try_execute(
        &self,
        op: &Operation,
        inputs: &[CpuTensor],
        outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>>;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct NoopInterceptor;

impl CpuKernelInterceptor for NoopInterceptor {
    fn try_execute(
        &self,
        _op: &Operation,
        _inputs: &[CpuTensor],
        _outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>> {
        None
    }
}

/// Reference interpreter parameterised over a kernel interceptor.
#[derive(Clone)]
pub struct GenericCpuBackend<I: CpuKernelInterceptor> {
    interceptor: Arc<I>,
    name: Arc<str>,
}

impl<I: CpuKernelInterceptor> GenericCpuBackend<I> {
    pub fn with_interceptor(interceptor: I) -> Self {
        Self::with_arc(Arc::new(interceptor))
    }

    pub fn with_arc(interceptor: Arc<I>) -> Self {
        Self {
            interceptor,
            name: Arc::from(crate::INTERPRETER_BACKEND_NAME),
        }
    }

    /// Overrides the name reported by [`PortableBackend::backend_name`].
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn interceptor(&self) -> &I {
        self.interceptor.as_ref()
    }
}

impl GenericCpuBackend<NoopInterceptor> {
    pub fn new() -> Self {
        Self::with_interceptor(NoopInterceptor)
    }
}

impl Default for GenericCpuBackend<NoopInterceptor> {
    fn default() -> Self {
        Self::new()
    }
}

pub type CpuPortableBackend = GenericCpuBackend<NoopInterceptor>;

impl<I: CpuKernelInterceptor> PortableBackend for GenericCpuBackend<I> {
    type TensorHandle = CpuTensor;

    fn backend_name(&self) -> &str {
        &self.name
    }

    fn materialize(&self, init: TensorInit) -> BackendResult<Self::TensorHandle> {
        match init {
            TensorInit::Literal(lit) => CpuTensor::from_literal(&lit),
            TensorInit::Zeroed(spec) => CpuTensor::zeroed(&spec),
        }
    }

    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral> {
        Ok(tensor.to_literal())
    }

    fn execute_instruction(
        &self,
        instruction: &Instruction,
        inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        execute_operation(self.interceptor.as_ref(), instruction, inputs)
    }

    fn run_program(
        &self,
        program: &Program,
        entry_inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        let function = program.entry_function().ok_or_else(|| {
            BackendError::spec(
                SpecErrorCode::EntryFunctionMissing,
                format!("@{}", program.entry),
            )
        })?;

        if function.parameter_ids.len() != entry_inputs.len() {
            return Err(BackendError::spec(
                SpecErrorCode::ArityMismatch,
                format!(
                    "@{} takes {} inputs, {} supplied",
                    function.name,
                    function.parameter_ids.len(),
                    entry_inputs.len()
                ),
            ));
        }

        let mut values: HashMap<ValueId, CpuTensor> = HashMap::new();
        for ((param_id, spec), handle) in function
            .parameter_ids
            .iter()
            .zip(&function.parameters)
            .zip(entry_inputs)
        {
            ensure_same_spec(spec, &handle.spec)?;
            values.insert(*param_id, handle.clone());
        }

        for (instr_index, instruction) in function.body.iter().enumerate() {
            let mut inputs = Vec::with_capacity(instruction.operands.len());
            for operand in &instruction.operands {
                let tensor = match operand {
                    Operand::Value(id) => values.get(id).cloned().ok_or_else(|| {
                        BackendError::spec(
                            SpecErrorCode::UndefinedValue,
                            format!("%{} used by %{}", id.0, instruction.id.0),
                        )
                    })?,
                    Operand::Literal(lit) => CpuTensor::from_literal(lit)?,
                };
                inputs.push(tensor);
            }
            tracing::trace!(
                backend = %self.name,
                index = instr_index,
                op = %instruction.op.label(),
                output = %instruction.output,
                "executing instruction"
            );
            let outputs = self
                .execute_instruction(instruction, &inputs)
                .map_err(|err| {
                    augment_backend_error(err, &function.name, instr_index, instruction, &inputs)
                })?;
            let output = expect_single_output(outputs)?;
            values.insert(instruction.id, output);
        }

        let mut results = Vec::with_capacity(function.result_ids.len());
        for id in &function.result_ids {
            let value = values.get(id).cloned().ok_or_else(|| {
                BackendError::spec(SpecErrorCode::UndefinedValue, format!("result %{}", id.0))
            })?;
            results.push(value);
        }
        Ok(results)
    }
}

fn execute_operation(
    interceptor: &dyn CpuKernelInterceptor,
    instruction: &Instruction,
    inputs: &[CpuTensor],
) -> BackendResult<Vec<CpuTensor>> {
    let output_specs = [instruction.output.clone()];

    if let Some(result) = interceptor.try_execute(&instruction.op, inputs, &output_specs) {
        return result;
    }

    let output = &output_specs[0];
    let result = match &instruction.op {
        Operation::Constant(literal) => CpuTensor::from_literal(literal)?,
        Operation::ElementwiseUnary(op) => {
            let input = expect_single(inputs)?;
            kernels::elementwise_unary(*op, input, output)?
        }
        Operation::ElementwiseBinary(op) => {
            let (lhs, rhs) = expect_pair(inputs)?;
            kernels::elementwise_binary(*op, lhs, rhs, output)?
        }
    };
    Ok(vec![result])
}

fn expect_single_output(mut outputs: Vec<CpuTensor>) -> BackendResult<CpuTensor> {
    match (outputs.pop(), outputs.is_empty()) {
        (Some(output), true) => Ok(output),
        _ => Err(BackendError::execution(
            "instructions must produce exactly one result",
        )),
    }
}

pub(crate) fn expect_single(inputs: &[CpuTensor]) -> BackendResult<&CpuTensor> {
    match inputs {
        [input] => Ok(input),
        _ => Err(BackendError::spec(
            SpecErrorCode::ArityMismatch,
            format!("expected 1 input, found {}", inputs.len()),
        )),
    }
}

pub(crate) fn expect_pair(inputs: &[CpuTensor]) -> BackendResult<(&CpuTensor, &CpuTensor)> {
    match inputs {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(BackendError::spec(
            SpecErrorCode::ArityMismatch,
            format!("expected 2 inputs, found {}", inputs.len()),
        )),
    }
}

fn augment_backend_error(
    error: BackendError,
    function_name: &str,
    instruction_index: usize,
    instruction: &Instruction,
    inputs: &[CpuTensor],
) -> BackendError {
    let location = format!(
        "at function `{}` instruction #{}, {} %{} operands [{}]",
        function_name,
        instruction_index,
        instruction.op.label(),
        instruction.id.0,
        format_operands(&instruction.operands, inputs)
    );
    match error {
        BackendError::Execution { message } => BackendError::Execution {
            message: format!("{message} ({location})"),
        },
        BackendError::Unimplemented { op, reason } => BackendError::Unimplemented {
            op,
            reason: format!("{reason} (while executing {location})"),
        },
        BackendError::SpecViolation(mut err) => {
            err.detail = Some(match err.detail.take() {
                Some(detail) => format!("{detail}; {location}"),
                None => location,
            });
            BackendError::SpecViolation(err)
        }
    }
}

fn format_operands(operands: &[Operand], inputs: &[CpuTensor]) -> String {
    if operands.is_empty() {
        return String::from("<none>");
    }

    operands
        .iter()
        .zip(inputs.iter())
        .map(|(operand, tensor)| match operand {
            Operand::Value(id) => format!("%{} {}", id.0, tensor.spec),
            Operand::Literal(_) => format!("literal {}", tensor.spec),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
