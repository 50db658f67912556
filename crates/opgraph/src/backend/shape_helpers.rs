//! Shared shape helpers used across backends.

use crate::backend::spec::{BackendError, BackendResult, Shape, SpecErrorCode, TensorSpec};

/// Computes `product(dims)` with overflow checking.
pub fn checked_element_count_or_error<E, F>(dims: &[usize], mut on_overflow: F) -> Result<usize, E>
where
    F: FnMut() -> E,
{
    let mut count = 1usize;
    for dim in dims {
        count = count.checked_mul(*dim).ok_or_else(&mut on_overflow)?;
    }
    Ok(count)
}

/// Element count of `shape`, reported as a spec violation on overflow.
pub fn element_count(shape: &Shape) -> BackendResult<usize> {
    checked_element_count_or_error(shape.dims(), || {
        BackendError::spec(
            SpecErrorCode::ElementCountOverflow,
            format!("shape {shape}"),
        )
    })
}

/// Fails unless `actual` has the same dtype and shape as `expected`.
pub fn ensure_same_spec(expected: &TensorSpec, actual: &TensorSpec) -> BackendResult<()> {
    if expected.dtype != actual.dtype {
        return Err(BackendError::spec(
            SpecErrorCode::DTypeMismatch,
            format!("expected {expected}, found {actual}"),
        ));
    }
    if expected.shape != actual.shape {
        return Err(BackendError::spec(
            SpecErrorCode::ShapeMismatch,
            format!("expected {expected}, found {actual}"),
        ));
    }
    Ok(())
}
