//! Elementwise kernels over every interpreter dtype.
//!
//! Integer arithmetic wraps (two's complement for signed, modulo for unsigned). `minimum` and
//! `maximum` use the element type's native `<` ordering, so `minimum(a, b)` is
//! `if a < b { a } else { b }` for floats too.

use std::sync::Arc;

use opgraph::backend::shape_helpers::element_count;
use opgraph::backend::spec::{
    BackendError, BackendResult, ElementwiseBinaryOp, ElementwiseUnaryOp, SpecErrorCode,
    TensorSpec,
};

use crate::cpu::{CpuTensor, TensorData};

pub(crate) trait IntElement: Copy + PartialOrd {
    const SIGNED: bool;
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn wrapping_div(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;
    fn wrapping_abs(self) -> Self;
    fn is_zero(self) -> bool;
}

macro_rules! impl_int_element {
    (signed: $($s:ty),*; unsigned: $($u:ty),*) => {
        $(
            impl IntElement for $s {
                const SIGNED: bool = true;
                fn wrapping_add(self, rhs: Self) -> Self { <$s>::wrapping_add(self, rhs) }
                fn wrapping_sub(self, rhs: Self) -> Self { <$s>::wrapping_sub(self, rhs) }
                fn wrapping_mul(self, rhs: Self) -> Self { <$s>::wrapping_mul(self, rhs) }
                fn wrapping_div(self, rhs: Self) -> Self { <$s>::wrapping_div(self, rhs) }
                fn wrapping_neg(self) -> Self { <$s>::wrapping_neg(self) }
                fn wrapping_abs(self) -> Self { <$s>::wrapping_abs(self) }
                fn is_zero(self) -> bool { self == 0 }
            }
        )*
        $(
            impl IntElement for $u {
                const SIGNED: bool = false;
                fn wrapping_add(self, rhs: Self) -> Self { <$u>::wrapping_add(self, rhs) }
                fn wrapping_sub(self, rhs: Self) -> Self { <$u>::wrapping_sub(self, rhs) }
                fn wrapping_mul(self, rhs: Self) -> Self { <$u>::wrapping_mul(self, rhs) }
                fn wrapping_div(self, rhs: Self) -> Self { <$u>::wrapping_div(self, rhs) }
                fn wrapping_neg(self) -> Self { <$u>::wrapping_neg(self) }
                fn wrapping_abs(self) -> Self { self }
                fn is_zero(self) -> bool { self == 0 }
            }
        )*
    };
}

impl_int_element!(signed: i8, i16, i32, i64; unsigned: u8, u16, u32, u64);

pub(crate) trait FloatElement: Copy + PartialOrd {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn unary(self, op: ElementwiseUnaryOp) -> Self;
}

macro_rules! impl_float_element {
    ($($ty:ty),*) => {
        $(
            impl FloatElement for $ty {
                fn add(self, rhs: Self) -> Self { self + rhs }
                fn sub(self, rhs: Self) -> Self { self - rhs }
                fn mul(self, rhs: Self) -> Self { self * rhs }
                fn div(self, rhs: Self) -> Self { self / rhs }

                fn unary(self, op: ElementwiseUnaryOp) -> Self {
                    match op {
                        ElementwiseUnaryOp::Neg => -self,
                        ElementwiseUnaryOp::Abs => self.abs(),
                        ElementwiseUnaryOp::Exp => self.exp(),
                        ElementwiseUnaryOp::Log => self.ln(),
                        ElementwiseUnaryOp::Sqrt => self.sqrt(),
                        ElementwiseUnaryOp::Sin => self.sin(),
                        ElementwiseUnaryOp::Cos => self.cos(),
                        ElementwiseUnaryOp::Tan => self.tan(),
                        ElementwiseUnaryOp::Sinh => self.sinh(),
                        ElementwiseUnaryOp::Cosh => self.cosh(),
                        ElementwiseUnaryOp::Tanh => self.tanh(),
                    }
                }
            }
        )*
    };
}

impl_float_element!(f32, f64);

fn select_min<T: PartialOrd + Copy>(a: T, b: T) -> T {
    if a < b {
        a
    } else {
        b
    }
}

fn select_max<T: PartialOrd + Copy>(a: T, b: T) -> T {
    if a > b {
        a
    } else {
        b
    }
}

pub(crate) fn binary_int<T: IntElement>(
    op: ElementwiseBinaryOp,
    lhs: &[T],
    rhs: &[T],
) -> BackendResult<Arc<[T]>> {
    let mut out = Vec::with_capacity(lhs.len());
    for (index, (&a, &b)) in lhs.iter().zip(rhs).enumerate() {
        let value = match op {
            ElementwiseBinaryOp::Add => a.wrapping_add(b),
            ElementwiseBinaryOp::Sub => a.wrapping_sub(b),
            ElementwiseBinaryOp::Mul => a.wrapping_mul(b),
            ElementwiseBinaryOp::Div => {
                if b.is_zero() {
                    return Err(BackendError::spec(
                        SpecErrorCode::IntegerDivideByZero,
                        format!("divisor is zero at element {index}"),
                    ));
                }
                a.wrapping_div(b)
            }
            ElementwiseBinaryOp::Minimum => select_min(a, b),
            ElementwiseBinaryOp::Maximum => select_max(a, b),
        };
        out.push(value);
    }
    Ok(Arc::from(out))
}

pub(crate) fn binary_float<T: FloatElement>(
    op: ElementwiseBinaryOp,
    lhs: &[T],
    rhs: &[T],
) -> Arc<[T]> {
    lhs.iter()
        .zip(rhs)
        .map(|(&a, &b)| match op {
            ElementwiseBinaryOp::Add => a.add(b),
            ElementwiseBinaryOp::Sub => a.sub(b),
            ElementwiseBinaryOp::Mul => a.mul(b),
            ElementwiseBinaryOp::Div => a.div(b),
            ElementwiseBinaryOp::Minimum => select_min(a, b),
            ElementwiseBinaryOp::Maximum => select_max(a, b),
        })
        .collect()
}

fn unary_signed<T: IntElement>(op: ElementwiseUnaryOp, values: &[T]) -> BackendResult<Arc<[T]>> {
    let map: fn(T) -> T = match op {
        ElementwiseUnaryOp::Neg if T::SIGNED => T::wrapping_neg,
        ElementwiseUnaryOp::Abs if T::SIGNED => T::wrapping_abs,
        _ => {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeNotSupported,
                format!("{} requires a float or signed integer input", op.name()),
            ))
        }
    };
    Ok(values.iter().map(|&x| map(x)).collect())
}

pub(crate) fn check_operand(input: &CpuTensor, output: &TensorSpec) -> BackendResult<()> {
    if input.data.dtype() != output.dtype {
        return Err(BackendError::spec(
            SpecErrorCode::DTypeMismatch,
            format!("operand {} vs output {}", input.spec, output),
        ));
    }
    let expected = element_count(&output.shape)?;
    if input.data.len() != expected {
        return Err(BackendError::spec(
            SpecErrorCode::ShapeMismatch,
            format!(
                "operand holds {} elements, output {} needs {}",
                input.data.len(),
                output,
                expected
            ),
        ));
    }
    Ok(())
}

pub(crate) fn elementwise_unary(
    op: ElementwiseUnaryOp,
    input: &CpuTensor,
    output: &TensorSpec,
) -> BackendResult<CpuTensor> {
    check_operand(input, output)?;
    let data = match &input.data {
        TensorData::F32(values) => TensorData::F32(values.iter().map(|&x| x.unary(op)).collect()),
        TensorData::F64(values) => TensorData::F64(values.iter().map(|&x| x.unary(op)).collect()),
        TensorData::Si8(values) => TensorData::Si8(unary_signed(op, values)?),
        TensorData::Si16(values) => TensorData::Si16(unary_signed(op, values)?),
        TensorData::Si32(values) => TensorData::Si32(unary_signed(op, values)?),
        TensorData::Si64(values) => TensorData::Si64(unary_signed(op, values)?),
        TensorData::Ui8(values) => TensorData::Ui8(unary_signed(op, values)?),
        TensorData::Ui16(values) => TensorData::Ui16(unary_signed(op, values)?),
        TensorData::Ui32(values) => TensorData::Ui32(unary_signed(op, values)?),
        TensorData::Ui64(values) => TensorData::Ui64(unary_signed(op, values)?),
        TensorData::Bool(_) => {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeNotSupported,
                format!("{} on i1", op.name()),
            ))
        }
    };
    Ok(CpuTensor {
        spec: output.clone(),
        data,
    })
}

pub(crate) fn elementwise_binary(
    op: ElementwiseBinaryOp,
    lhs: &CpuTensor,
    rhs: &CpuTensor,
    output: &TensorSpec,
) -> BackendResult<CpuTensor> {
    check_operand(lhs, output)?;
    check_operand(rhs, output)?;

    macro_rules! dispatch {
        ($( $variant:ident => $kernel:ident ),*) => {
            match (&lhs.data, &rhs.data) {
                $(
                    (TensorData::$variant(a), TensorData::$variant(b)) => {
                        TensorData::$variant(dispatch!(@call $kernel, a, b))
                    }
                )*
                _ => {
                    return Err(BackendError::spec(
                        SpecErrorCode::DTypeNotSupported,
                        format!("{} on {}", op.name(), output.dtype),
                    ))
                }
            }
        };
        (@call binary_int, $a:ident, $b:ident) => { binary_int(op, $a, $b)? };
        (@call binary_float, $a:ident, $b:ident) => { binary_float(op, $a, $b) };
    }

    let data = dispatch!(
        Si8 => binary_int,
        Ui8 => binary_int,
        Si16 => binary_int,
        Ui16 => binary_int,
        Si32 => binary_int,
        Ui32 => binary_int,
        Si64 => binary_int,
        Ui64 => binary_int,
        F32 => binary_float,
        F64 => binary_float
    );
    Ok(CpuTensor {
        spec: output.clone(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_division_wraps_on_overflow() {
        let out = binary_int(ElementwiseBinaryOp::Div, &[i32::MIN], &[-1]).unwrap();
        assert_eq!(&*out, &[i32::MIN]);
    }

    #[test]
    fn division_by_zero_reports_element() {
        let err = binary_int(ElementwiseBinaryOp::Div, &[4u16, 1], &[2, 0]).unwrap_err();
        assert_eq!(err.spec_code(), Some(&SpecErrorCode::IntegerDivideByZero));
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn float_minimum_prefers_rhs_when_unordered() {
        let out = binary_float(ElementwiseBinaryOp::Minimum, &[f32::NAN, 1.0], &[2.0, f32::NAN]);
        assert_eq!(out[0], 2.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn unsigned_negation_is_rejected() {
        let err = unary_signed(ElementwiseUnaryOp::Neg, &[1u32]).unwrap_err();
        assert_eq!(err.spec_code(), Some(&SpecErrorCode::DTypeNotSupported));
    }
}
