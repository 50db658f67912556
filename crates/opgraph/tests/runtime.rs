use opgraph::graph::{self, Graph};
use opgraph::runtime::Backend;
use opgraph::{DType, PortableBackend, Shape};
use opgraph_backend_interpreter::CpuPortableBackend;

fn backend() -> Backend {
    Backend::from_portable(CpuPortableBackend::new())
}

#[test]
fn cosh_round_trip_through_the_facade() {
    let backend = backend();
    let x = graph::parameter(DType::F64, [2]);
    let graph = Graph::new(vec![graph::cosh(&x).unwrap()], vec![x]).unwrap();
    let executable = backend.compile(&graph).unwrap();
    assert_eq!(executable.backend_name(), "interpreter");
    assert_eq!(executable.parameter_specs().len(), 1);

    let mut input = backend.create_tensor(DType::F64, [2]).unwrap();
    backend.copy_data(&mut input, &[0.0f64, 1.0]).unwrap();
    let mut output = backend.create_tensor(DType::F64, [2]).unwrap();
    executable
        .call_with_validate(&mut [&mut output], &[&input])
        .unwrap();
    let values = backend.read_vector::<f64>(&output).unwrap();
    assert_eq!(values[0], 1.0);
    assert_eq!(values[1], 1.0f64.cosh());
}

#[test]
fn input_dtype_mismatch_is_reported_before_execution() {
    let backend = backend();
    let a = graph::parameter(DType::Si64, [2]);
    let b = graph::parameter(DType::Si64, [2]);
    let graph = Graph::new(vec![graph::minimum(&a, &b).unwrap()], vec![a, b]).unwrap();
    let executable = backend.compile(&graph).unwrap();

    let wrong = backend.create_tensor(DType::Si32, [2]).unwrap();
    let right = backend.create_tensor(DType::Si64, [2]).unwrap();
    let mut output = backend.create_tensor(DType::Si64, [2]).unwrap();
    let err = executable
        .call_with_validate(&mut [&mut output], &[&wrong, &right])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "input 0 has dtype si32 but the graph declares si64"
    );
}

#[test]
fn reading_with_the_wrong_element_type_fails() {
    let backend = backend();
    let tensor = backend.create_tensor(DType::Ui32, Shape::new([3])).unwrap();
    assert_eq!(tensor.spec().to_string(), "tensor<ui32 x 3>");
    assert!(backend.read_vector::<i32>(&tensor).is_err());
    assert_eq!(backend.read_vector::<u32>(&tensor).unwrap(), vec![0, 0, 0]);
}

#[test]
fn tensors_are_bound_to_their_backend() {
    let first = backend();
    let second = Backend::from_portable(CpuPortableBackend::new().named("other"));
    let mut tensor = first.create_tensor(DType::F32, [1]).unwrap();
    let err = second.copy_data(&mut tensor, &[1.0f32]).unwrap_err();
    assert!(err.to_string().contains("belongs to backend interpreter"));
}

#[test]
fn compile_rejects_dtypes_the_backend_lacks() {
    struct NoF64(CpuPortableBackend);

    impl PortableBackend for NoF64 {
        type TensorHandle = <CpuPortableBackend as PortableBackend>::TensorHandle;

        fn backend_name(&self) -> &str {
            "no-f64"
        }

        fn supports_dtype(&self, dtype: DType) -> bool {
            dtype != DType::F64
        }

        fn materialize(
            &self,
            init: opgraph::backend::spec::TensorInit,
        ) -> opgraph::backend::spec::BackendResult<Self::TensorHandle> {
            self.0.materialize(init)
        }

        fn to_literal(
            &self,
            tensor: &Self::TensorHandle,
        ) -> opgraph::backend::spec::BackendResult<opgraph::backend::spec::TensorLiteral> {
            self.0.to_literal(tensor)
        }

        fn execute_instruction(
            &self,
            instruction: &opgraph::backend::spec::Instruction,
            inputs: &[Self::TensorHandle],
        ) -> opgraph::backend::spec::BackendResult<Vec<Self::TensorHandle>> {
            self.0.execute_instruction(instruction, inputs)
        }

        fn run_program(
            &self,
            program: &opgraph::backend::spec::Program,
            entry_inputs: &[Self::TensorHandle],
        ) -> opgraph::backend::spec::BackendResult<Vec<Self::TensorHandle>> {
            self.0.run_program(program, entry_inputs)
        }
    }

    let backend = Backend::from_portable(NoF64(CpuPortableBackend::new()));
    assert!(backend.create_tensor(DType::F64, [1]).is_err());
    let x = graph::parameter(DType::F64, [1]);
    let graph = Graph::new(vec![graph::cosh(&x).unwrap()], vec![x]).unwrap();
    let err = backend.compile(&graph).err().unwrap();
    assert!(err.to_string().contains("dtype f64 is not supported"));
}

#[test]
fn single_instructions_execute_through_the_erased_backend() {
    use opgraph::backend::spec::{TensorInit, TensorLiteral};

    let backend = backend();
    let a = graph::parameter(DType::Ui32, [3]);
    let b = graph::parameter(DType::Ui32, [3]);
    let program = Graph::new(vec![graph::minimum(&a, &b).unwrap()], vec![a, b])
        .unwrap()
        .lower("main")
        .unwrap();
    let instruction = &program.entry_function().unwrap().body[0];

    let erased = backend.erased();
    let lhs = erased
        .materialize(TensorInit::Literal(
            TensorLiteral::from_values(Shape::new([3]), &[u32::MAX, 7, 0]).unwrap(),
        ))
        .unwrap();
    let rhs = erased
        .materialize(TensorInit::Literal(
            TensorLiteral::from_values(Shape::new([3]), &[10u32, 9, 0]).unwrap(),
        ))
        .unwrap();
    let outputs = erased.execute_instruction(instruction, &[lhs, rhs]).unwrap();
    assert_eq!(outputs.len(), 1);
    let literal = erased.to_literal(&outputs[0]).unwrap();
    assert_eq!(literal.to_values::<u32>().unwrap(), vec![10, 7, 0]);
}
