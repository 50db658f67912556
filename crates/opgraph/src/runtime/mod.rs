//! Runtime facade: named backends, host-visible tensors, and compiled executables.
//!
//! This is the surface conformance cases program against: request a backend by name, create
//! tensors, compile a [`Graph`], call it with explicit output and input bindings.

pub mod element;
mod executable;
mod tensor;

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};

use crate::backend::registry::{self, ErasedBackend};
use crate::backend::spec::{validate_program, DType, PortableBackend, Shape, TensorInit, TensorSpec};
use crate::graph::Graph;

pub use element::Element;
pub use executable::Executable;
pub use tensor::Tensor;

/// Named execution target.
#[derive(Clone)]
pub struct Backend {
    inner: Arc<dyn ErasedBackend>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name())
            .finish()
    }
}

impl Backend {
    /// Resolves a backend from the global registry.
    pub fn create(name: &str) -> Result<Self> {
        let inner = registry::create_backend(name)?;
        tracing::debug!(backend = name, "created backend");
        Ok(Self {
            inner: Arc::from(inner),
        })
    }

    /// Wraps a concrete backend directly, bypassing the registry.
    pub fn from_portable<B: PortableBackend + 'static>(backend: B) -> Self {
        Self {
            inner: Arc::from(registry::erase_backend(backend)),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.backend_name()
    }

    pub fn supports_dtype(&self, dtype: DType) -> bool {
        self.inner.supports_dtype(dtype)
    }

    pub fn erased(&self) -> &dyn ErasedBackend {
        self.inner.as_ref()
    }

    /// Allocates a zero-initialised tensor on this backend.
    pub fn create_tensor(&self, dtype: DType, shape: impl Into<Shape>) -> Result<Tensor> {
        let spec = TensorSpec::new(dtype, shape.into());
        ensure!(
            self.supports_dtype(dtype),
            "backend {} does not support dtype {}",
            self.name(),
            dtype
        );
        let handle = self
            .inner
            .materialize(TensorInit::Zeroed(spec.clone()))
            .with_context(|| format!("failed to allocate {spec} on {}", self.name()))?;
        Ok(Tensor::new(spec, handle, Arc::clone(&self.inner)))
    }

    /// Overwrites `tensor` with `values`; the length must equal its element count.
    pub fn copy_data<T: Element>(&self, tensor: &mut Tensor, values: &[T]) -> Result<()> {
        self.ensure_owner(tensor)?;
        tensor.write(values)
    }

    /// Reads the contents of `tensor` back to the host.
    pub fn read_vector<T: Element>(&self, tensor: &Tensor) -> Result<Vec<T>> {
        self.ensure_owner(tensor)?;
        tensor.read()
    }

    /// Lowers, validates, and binds `graph` to this backend.
    pub fn compile(&self, graph: &Graph) -> Result<Executable> {
        let program = graph
            .lower("main")
            .context("failed to lower graph")?;
        validate_program(&program).context("lowered program failed validation")?;
        let specs = graph
            .parameter_specs()
            .into_iter()
            .chain(graph.result_specs());
        for spec in specs {
            if !self.supports_dtype(spec.dtype) {
                return Err(anyhow!(
                    "backend {} cannot compile graph: dtype {} is not supported",
                    self.name(),
                    spec.dtype
                ));
            }
        }
        tracing::debug!(
            backend = self.name(),
            instructions = program.functions.first().map_or(0, |f| f.body.len()),
            "compiled graph"
        );
        Ok(Executable::new(
            program,
            graph.parameter_specs(),
            graph.result_specs(),
            Arc::clone(&self.inner),
        ))
    }

    fn ensure_owner(&self, tensor: &Tensor) -> Result<()> {
        ensure!(
            tensor.backend_name() == self.name(),
            "tensor belongs to backend {} but was used with {}",
            tensor.backend_name(),
            self.name()
        );
        Ok(())
    }
}
