use opgraph::backend::spec::{BackendResult, DType, ElementwiseUnaryOp, Operation, TensorSpec};

use crate::cpu::{expect_single, CpuKernelInterceptor, CpuTensor, GenericCpuBackend, TensorData};
use crate::kernels::{check_operand, elementwise_unary, FloatElement};

/// Evaluates `f32` transcendental ops in `f64` and rounds the result back.
///
/// Outputs differ from the plain interpreter by final rounding only.
#[derive(Default, Clone, Copy, Debug)]
pub struct WidenedPrecisionInterceptor;

impl CpuKernelInterceptor for WidenedPrecisionInterceptor {
    fn try_execute(
        &self,
        op: &Operation,
        inputs: &[CpuTensor],
        outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>> {
        let Operation::ElementwiseUnary(kind) = op else {
            return None;
        };
        if !kind.requires_float() {
            return None;
        }
        let output = outputs.first()?;
        if output.dtype != DType::F32 {
            return None;
        }
        Some(widen_unary(*kind, inputs, output).map(|tensor| vec![tensor]))
    }
}

fn widen_unary(
    op: ElementwiseUnaryOp,
    inputs: &[CpuTensor],
    output: &TensorSpec,
) -> BackendResult<CpuTensor> {
    let input = expect_single(inputs)?;
    check_operand(input, output)?;
    let TensorData::F32(values) = &input.data else {
        return elementwise_unary(op, input, output);
    };
    let data = values
        .iter()
        .map(|&x| f64::from(x).unary(op) as f32)
        .collect();
    Ok(CpuTensor {
        spec: output.clone(),
        data: TensorData::F32(data),
    })
}

pub type WidenedPrecisionBackend = GenericCpuBackend<WidenedPrecisionInterceptor>;

impl WidenedPrecisionBackend {
    pub fn widened() -> Self {
        GenericCpuBackend::with_interceptor(WidenedPrecisionInterceptor)
            .named(crate::WIDENED_BACKEND_NAME)
    }
}
