//! Runtime backend registry for selecting backends by name.
//!
//! Backend crates register constructors into a process-wide table; the conformance suite and the
//! CLI then resolve a backend from a plain string without depending on its concrete type.

use super::spec::{
    BackendError, BackendResult, DType, Instruction, PortableBackend, Program, TensorInit,
    TensorLiteral,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use thiserror::Error;

/// Type-erased tensor handle that can be downcast to the backend's concrete handle.
pub type BackendHandle = Arc<dyn Any + Send + Sync>;

/// Factory function that creates a new backend instance.
pub type BackendConstructor = Box<dyn Fn() -> Box<dyn ErasedBackend> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("backend '{name}' is not registered (available: {})", display_names(.available))]
    UnknownBackend {
        name: String,
        available: Vec<String>,
    },
}

fn display_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Object-safe view of a [`PortableBackend`].
///
/// Every method works with [`BackendHandle`]s that get downcast internally.
pub trait ErasedBackend: Send + Sync {
    /// Returns a human-readable backend identifier (e.g., "interpreter").
    fn backend_name(&self) -> &str;

    fn supports_dtype(&self, dtype: DType) -> bool;

    /// Materializes a tensor handle from host initialization data.
    fn materialize(&self, init: TensorInit) -> BackendResult<BackendHandle>;

    /// Reads back a tensor handle into a dense literal.
    fn to_literal(&self, handle: &BackendHandle) -> BackendResult<TensorLiteral>;

    fn execute_instruction(
        &self,
        instruction: &Instruction,
        inputs: &[BackendHandle],
    ) -> BackendResult<Vec<BackendHandle>>;

    /// Executes the entry function of `program`.
    fn run_program(
        &self,
        program: &Program,
        entry_inputs: &[BackendHandle],
    ) -> BackendResult<Vec<BackendHandle>>;

    /// Downcast to Any for type recovery when needed.
    fn as_any(&self) -> &dyn Any;
}

/// Wrapper that implements ErasedBackend for any concrete PortableBackend.
struct BackendWrapper<B: PortableBackend> {
    inner: Arc<B>,
}

impl<B: PortableBackend + 'static> BackendWrapper<B> {
    fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    fn backend(&self) -> &Arc<B> {
        &self.inner
    }

    fn downcast_all(&self, handles: &[BackendHandle]) -> BackendResult<Vec<B::TensorHandle>> {
        handles
            .iter()
            .map(|handle| self.downcast(handle).cloned())
            .collect()
    }

    fn downcast<'a>(&self, handle: &'a BackendHandle) -> BackendResult<&'a B::TensorHandle> {
        handle.downcast_ref::<B::TensorHandle>().ok_or_else(|| {
            BackendError::execution(format!(
                "handle type mismatch for backend {}",
                self.inner.backend_name()
            ))
        })
    }

    fn erase_all(outputs: Vec<B::TensorHandle>) -> Vec<BackendHandle> {
        outputs
            .into_iter()
            .map(|h| Arc::new(h) as BackendHandle)
            .collect()
    }
}

impl<B: PortableBackend + 'static> ErasedBackend for BackendWrapper<B> {
    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }

    fn supports_dtype(&self, dtype: DType) -> bool {
        self.inner.supports_dtype(dtype)
    }

    fn materialize(&self, init: TensorInit) -> BackendResult<BackendHandle> {
        let handle = self.inner.materialize(init)?;
        Ok(Arc::new(handle) as BackendHandle)
    }

    fn to_literal(&self, handle: &BackendHandle) -> BackendResult<TensorLiteral> {
        self.inner.to_literal(self.downcast(handle)?)
    }

    fn execute_instruction(
        &self,
        instruction: &Instruction,
        inputs: &[BackendHandle],
    ) -> BackendResult<Vec<BackendHandle>> {
        let typed_inputs = self.downcast_all(inputs)?;
        let outputs = self.inner.execute_instruction(instruction, &typed_inputs)?;
        Ok(Self::erase_all(outputs))
    }

    fn run_program(
        &self,
        program: &Program,
        entry_inputs: &[BackendHandle],
    ) -> BackendResult<Vec<BackendHandle>> {
        let typed_inputs = self.downcast_all(entry_inputs)?;
        let outputs = self.inner.run_program(program, &typed_inputs)?;
        Ok(Self::erase_all(outputs))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wraps a concrete backend without going through the global table.
pub fn erase_backend<B: PortableBackend + 'static>(backend: B) -> Box<dyn ErasedBackend> {
    Box::new(BackendWrapper::new(backend))
}

struct BackendRegistry {
    backends: RwLock<HashMap<String, BackendConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: BackendConstructor) {
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if backends.insert(name.clone(), constructor).is_some() {
            tracing::debug!(backend = %name, "replaced registered backend constructor");
        } else {
            tracing::debug!(backend = %name, "registered backend");
        }
    }

    fn create(&self, name: &str) -> Result<Box<dyn ErasedBackend>, RegistryError> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        match backends.get(name) {
            Some(constructor) => Ok(constructor()),
            None => {
                let mut available: Vec<String> = backends.keys().cloned().collect();
                available.sort();
                Err(RegistryError::UnknownBackend {
                    name: name.to_string(),
                    available,
                })
            }
        }
    }

    fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_backend(&self, name: &str) -> bool {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Register a backend by name with a constructor function.
///
/// The constructor runs each time the backend is requested via [`create_backend`]. Registering
/// an existing name replaces the previous constructor.
///
/// # Example
/// ```ignore
/// use opgraph::backend::registry::register_backend;
///
/// pub fn register() {
///     register_backend("my_backend", || opgraph::backend::registry::erase_backend(MyBackend::new()));
/// }
/// ```
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Box<dyn ErasedBackend> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Register a concrete PortableBackend implementation.
pub fn register_portable_backend<B, F>(name: impl Into<String>, constructor: F)
where
    B: PortableBackend + 'static,
    F: Fn() -> B + Send + Sync + 'static,
{
    register_backend(name, move || erase_backend(constructor()));
}

/// Create a backend instance by name.
pub fn create_backend(name: &str) -> Result<Box<dyn ErasedBackend>, RegistryError> {
    global_registry().create(name)
}

/// All registered backend names, sorted.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

pub fn has_backend(name: &str) -> bool {
    global_registry().has_backend(name)
}

/// Recovers the concrete backend behind an erased one.
pub fn get_typed_backend<B: PortableBackend + 'static>(
    backend: &dyn ErasedBackend,
) -> Option<Arc<B>> {
    backend
        .as_any()
        .downcast_ref::<BackendWrapper<B>>()
        .map(|wrapper| Arc::clone(wrapper.backend()))
}
