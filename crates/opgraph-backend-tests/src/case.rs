//! Shared plumbing for conformance cases: context, failures, and the graph execution helper.

use std::fmt::Display;

use opgraph::graph::{self, Graph, GraphError, NodeRef};
use opgraph::runtime::{Backend, Element};
use opgraph::Shape;
use thiserror::Error;

use crate::tolerance::{all_close, first_difference, BitTolerance, ToleranceBits};

/// Per-run settings handed to every case.
#[derive(Debug, Clone)]
pub struct CaseContext {
    pub backend: String,
    pub case: String,
    pub tolerance: ToleranceBits,
}

impl CaseContext {
    pub fn new(backend: impl Into<String>, case: impl Into<String>, tolerance: ToleranceBits) -> Self {
        Self {
            backend: backend.into(),
            case: case.into(),
            tolerance,
        }
    }

    pub fn setup(&self, err: impl Display) -> CaseFailure {
        CaseFailure::Setup {
            backend: self.backend.clone(),
            case: self.case.clone(),
            message: format!("{err:#}"),
        }
    }

    pub fn execution(&self, err: impl Display) -> CaseFailure {
        CaseFailure::Execution {
            backend: self.backend.clone(),
            case: self.case.clone(),
            message: format!("{err:#}"),
        }
    }

    fn mismatch(
        &self,
        index: usize,
        expected: impl Display,
        actual: impl Display,
        detail: String,
    ) -> CaseFailure {
        CaseFailure::Mismatch {
            backend: self.backend.clone(),
            case: self.case.clone(),
            index,
            expected: expected.to_string(),
            actual: actual.to_string(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaseFailure {
    #[error("[{backend}] {case}: setup failed: {message}")]
    Setup {
        backend: String,
        case: String,
        message: String,
    },
    #[error("[{backend}] {case}: execution failed: {message}")]
    Execution {
        backend: String,
        case: String,
        message: String,
    },
    #[error(
        "[{backend}] {case}: mismatch at index {index}: expected {expected}, actual {actual} ({detail})"
    )]
    Mismatch {
        backend: String,
        case: String,
        index: usize,
        expected: String,
        actual: String,
        detail: String,
    },
}

/// Element type with a comparison policy: exact for integers, bit tolerance for floats.
pub trait CaseElement: Element {
    fn check(ctx: &CaseContext, expected: &[Self], actual: &[Self]) -> Result<(), CaseFailure>;
}

fn check_float<T: CaseElement + BitTolerance>(
    ctx: &CaseContext,
    expected: &[T],
    actual: &[T],
    zero: T,
) -> Result<(), CaseFailure> {
    let tolerance_bits = T::tolerance_bits(ctx.tolerance);
    let report =
        all_close(expected, actual, tolerance_bits, zero).map_err(|err| ctx.execution(err))?;
    match report.first_mismatch.clone() {
        None => {
            tracing::debug!(
                case = %ctx.case,
                mantissa_bits = report.min_matching_mantissa_bits,
                "float comparison passed"
            );
            Ok(())
        }
        Some(first) => Err(ctx.mismatch(
            first.index,
            first.expected,
            first.actual,
            report.to_string(),
        )),
    }
}

impl CaseElement for f32 {
    fn check(ctx: &CaseContext, expected: &[Self], actual: &[Self]) -> Result<(), CaseFailure> {
        check_float(ctx, expected, actual, 0.0)
    }
}

impl CaseElement for f64 {
    fn check(ctx: &CaseContext, expected: &[Self], actual: &[Self]) -> Result<(), CaseFailure> {
        check_float(ctx, expected, actual, 0.0)
    }
}

macro_rules! impl_exact_case_element {
    ($($ty:ty),*) => {
        $(
            impl CaseElement for $ty {
                fn check(ctx: &CaseContext, expected: &[Self], actual: &[Self]) -> Result<(), CaseFailure> {
                    match first_difference(expected, actual).map_err(|err| ctx.execution(err))? {
                        None => Ok(()),
                        Some(index) => Err(ctx.mismatch(
                            index,
                            expected[index],
                            actual[index],
                            "exact comparison".to_string(),
                        )),
                    }
                }
            }
        )*
    };
}

impl_exact_case_element!(i8, u8, i16, u16, i32, u32, i64, u64);

/// Builds a graph over one parameter per input, runs it on `backend`, and checks the result.
///
/// Every input must hold exactly `shape`'s element count, and `T` must be supported by the
/// backend; violations are setup failures.
pub fn run_elementwise<T, F>(
    backend: &Backend,
    ctx: &CaseContext,
    shape: Shape,
    inputs: &[&[T]],
    expected: &[T],
    build: F,
) -> Result<(), CaseFailure>
where
    T: CaseElement,
    F: FnOnce(&[NodeRef]) -> Result<NodeRef, GraphError>,
{
    let count = shape
        .element_count()
        .ok_or_else(|| ctx.setup(format!("shape {shape} overflows")))?;
    for (index, values) in inputs.iter().enumerate() {
        if values.len() != count {
            return Err(ctx.setup(format!(
                "input {index} has {} values but shape {shape} holds {count}",
                values.len()
            )));
        }
    }
    if !backend.supports_dtype(T::DTYPE) {
        return Err(ctx.setup(format!(
            "backend {} does not support {}",
            backend.name(),
            T::DTYPE
        )));
    }

    let params: Vec<NodeRef> = inputs
        .iter()
        .map(|_| graph::parameter(T::DTYPE, shape.clone()))
        .collect();
    let result = build(&params).map_err(|err| ctx.setup(err))?;
    let graph = Graph::new(vec![result], params).map_err(|err| ctx.setup(err))?;

    let mut tensors = Vec::with_capacity(inputs.len());
    for values in inputs {
        let mut tensor = backend
            .create_tensor(T::DTYPE, shape.clone())
            .map_err(|err| ctx.setup(err))?;
        backend
            .copy_data(&mut tensor, values)
            .map_err(|err| ctx.setup(err))?;
        tensors.push(tensor);
    }
    let mut output = backend
        .create_tensor(T::DTYPE, shape.clone())
        .map_err(|err| ctx.setup(err))?;

    let executable = backend.compile(&graph).map_err(|err| ctx.setup(err))?;
    let input_refs: Vec<_> = tensors.iter().collect();
    executable
        .call_with_validate(&mut [&mut output], &input_refs)
        .map_err(|err| ctx.execution(err))?;

    let actual: Vec<T> = backend
        .read_vector(&output)
        .map_err(|err| ctx.execution(err))?;
    T::check(ctx, expected, &actual)
}
