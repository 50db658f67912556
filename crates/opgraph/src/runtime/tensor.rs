use std::fmt;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};

use crate::backend::registry::{BackendHandle, ErasedBackend};
use crate::backend::spec::{DType, Shape, TensorInit, TensorLiteral, TensorSpec};

use super::element::Element;

/// Typed, shaped buffer owned by a backend.
///
/// The backend handle is immutable; writes and executable outputs rebind it.
#[derive(Clone)]
pub struct Tensor {
    spec: TensorSpec,
    handle: BackendHandle,
    backend: Arc<dyn ErasedBackend>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("spec", &self.spec)
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl Tensor {
    pub(crate) fn new(
        spec: TensorSpec,
        handle: BackendHandle,
        backend: Arc<dyn ErasedBackend>,
    ) -> Self {
        Self {
            spec,
            handle,
            backend,
        }
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn dtype(&self) -> DType {
        self.spec.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.spec.shape
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    pub(crate) fn handle(&self) -> &BackendHandle {
        &self.handle
    }

    pub(crate) fn rebind(&mut self, handle: BackendHandle) {
        self.handle = handle;
    }

    pub(crate) fn write<T: Element>(&mut self, values: &[T]) -> Result<()> {
        ensure!(
            T::DTYPE == self.spec.dtype,
            "cannot copy {} data into {}",
            T::DTYPE,
            self.spec
        );
        let literal = TensorLiteral::from_values(self.spec.shape.clone(), values)
            .with_context(|| format!("cannot copy {} values into {}", values.len(), self.spec))?;
        self.handle = self
            .backend
            .materialize(TensorInit::Literal(literal))
            .with_context(|| format!("failed to upload {} to {}", self.spec, self.backend_name()))?;
        Ok(())
    }

    pub(crate) fn read<T: Element>(&self) -> Result<Vec<T>> {
        ensure!(
            T::DTYPE == self.spec.dtype,
            "cannot read {} as {}",
            self.spec,
            T::DTYPE
        );
        self.to_literal()?
            .to_values::<T>()
            .with_context(|| format!("failed to decode {}", self.spec))
    }

    /// Dense copy of the current contents.
    pub fn to_literal(&self) -> Result<TensorLiteral> {
        let literal = self
            .backend
            .to_literal(&self.handle)
            .with_context(|| format!("failed to read back {}", self.spec))?;
        ensure!(
            literal.spec == self.spec,
            "backend returned {} for tensor declared as {}",
            literal.spec,
            self.spec
        );
        Ok(literal)
    }
}
