use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};

use crate::backend::registry::{BackendHandle, ErasedBackend};
use crate::backend::spec::{Program, TensorSpec};

use super::tensor::Tensor;

/// Compiled graph bound to a single backend.
///
/// Calls are synchronous and keep no state between invocations.
pub struct Executable {
    program: Program,
    parameters: Vec<TensorSpec>,
    results: Vec<TensorSpec>,
    backend: Arc<dyn ErasedBackend>,
}

impl Executable {
    pub(crate) fn new(
        program: Program,
        parameters: Vec<TensorSpec>,
        results: Vec<TensorSpec>,
        backend: Arc<dyn ErasedBackend>,
    ) -> Self {
        Self {
            program,
            parameters,
            results,
            backend,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn parameter_specs(&self) -> &[TensorSpec] {
        &self.parameters
    }

    pub fn result_specs(&self) -> &[TensorSpec] {
        &self.results
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Runs the program and rebinds `outputs` to the produced values.
    ///
    /// Bindings are not checked up front; use [`Executable::call_with_validate`] for that.
    pub fn call(&self, outputs: &mut [&mut Tensor], inputs: &[&Tensor]) -> Result<()> {
        let handles: Vec<BackendHandle> = inputs.iter().map(|t| t.handle().clone()).collect();
        let produced = self
            .backend
            .run_program(&self.program, &handles)
            .with_context(|| {
                format!(
                    "backend {} failed to run @{}",
                    self.backend_name(),
                    self.program.entry
                )
            })?;
        ensure!(
            produced.len() == outputs.len(),
            "program produced {} results but {} outputs were bound",
            produced.len(),
            outputs.len()
        );
        for (output, handle) in outputs.iter_mut().zip(produced) {
            output.rebind(handle);
        }
        tracing::debug!(
            backend = self.backend_name(),
            entry = %self.program.entry,
            outputs = outputs.len(),
            "executed program"
        );
        Ok(())
    }

    /// Checks every binding against the compiled signature, then calls.
    ///
    /// Count, backend, dtype or shape disagreements are reported without executing anything.
    pub fn call_with_validate(&self, outputs: &mut [&mut Tensor], inputs: &[&Tensor]) -> Result<()> {
        self.validate_bindings("input", &self.parameters, inputs.iter().map(|t| &**t))?;
        self.validate_bindings("output", &self.results, outputs.iter().map(|t| &**t))?;
        self.call(outputs, inputs)
    }

    fn validate_bindings<'a>(
        &self,
        role: &str,
        expected: &[TensorSpec],
        bound: impl ExactSizeIterator<Item = &'a Tensor>,
    ) -> Result<()> {
        ensure!(
            bound.len() == expected.len(),
            "expected {} {role} tensors, got {}",
            expected.len(),
            bound.len()
        );
        for (index, (spec, tensor)) in expected.iter().zip(bound).enumerate() {
            if tensor.backend_name() != self.backend_name() {
                bail!(
                    "{role} {index} belongs to backend {} but the executable runs on {}",
                    tensor.backend_name(),
                    self.backend_name()
                );
            }
            if tensor.dtype() != spec.dtype {
                bail!(
                    "{role} {index} has dtype {} but the graph declares {}",
                    tensor.dtype(),
                    spec.dtype
                );
            }
            if tensor.shape() != &spec.shape {
                bail!(
                    "{role} {index} has shape {} but the graph declares {}",
                    tensor.shape(),
                    spec.shape
                );
            }
        }
        Ok(())
    }
}
