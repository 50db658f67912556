use std::sync::{Arc, Mutex, PoisonError};

use opgraph::backend::spec::{
    BackendError, BackendResult, Function, Instruction, PortableBackend, Program, TensorInit,
    TensorLiteral, TensorSpec,
};

/// Portable backend that records the last program it was asked to run.
///
/// Tensors carry only their spec; reads return zeros. Clones share the recording, so a clone
/// can be handed to [`opgraph::runtime::Backend::from_portable`] and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    last_program: Arc<Mutex<Option<Program>>>,
}

impl RecordingBackend {
    pub const NAME: &'static str = "recording";

    pub fn recorded_program(&self) -> Option<Program> {
        self.last_program
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recorded_entry_function(&self) -> Option<Function> {
        self.recorded_program()
            .and_then(|program| program.entry_function().cloned())
    }
}

impl PortableBackend for RecordingBackend {
    type TensorHandle = TensorSpec;

    fn backend_name(&self) -> &str {
        Self::NAME
    }

    fn materialize(&self, init: TensorInit) -> BackendResult<Self::TensorHandle> {
        Ok(init.spec().clone())
    }

    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral> {
        TensorLiteral::zeroed(tensor.clone())
    }

    fn execute_instruction(
        &self,
        instruction: &Instruction,
        _inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        Ok(vec![instruction.output.clone()])
    }

    fn run_program(
        &self,
        program: &Program,
        _entry_inputs: &[Self::TensorHandle],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        let function = program.entry_function().ok_or_else(|| {
            BackendError::execution(format!("entry function @{} not found", program.entry))
        })?;
        let results = function.results.clone();
        self.last_program
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(program.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use opgraph::graph::{self, Graph};
    use opgraph::runtime::Backend;
    use opgraph::DType;

    use super::*;

    #[test]
    fn records_the_compiled_program() {
        let recorder = RecordingBackend::default();
        let backend = Backend::from_portable(recorder.clone());
        let x = graph::parameter(DType::F32, [2]);
        let graph = Graph::new(vec![graph::cosh(&x).unwrap()], vec![x]).unwrap();
        let executable = backend.compile(&graph).unwrap();

        let input = backend.create_tensor(DType::F32, [2]).unwrap();
        let mut output = backend.create_tensor(DType::F32, [2]).unwrap();
        executable
            .call_with_validate(&mut [&mut output], &[&input])
            .unwrap();

        let function = recorder.recorded_entry_function().unwrap();
        assert_eq!(function.body.len(), 1);
        assert_eq!(function.body[0].op.label(), "elementwise_unary.cosh");
        assert_eq!(backend.read_vector::<f32>(&output).unwrap(), vec![0.0, 0.0]);
    }
}
