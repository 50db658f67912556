//! Runtime API checks every backend must pass, independent of kernel numerics.
//!
//! Each function panics on violation and is wired into a `#[test]` by `define_backend_tests!`.

use std::fmt::Display;

use opgraph::graph::{self, Graph};
use opgraph::runtime::{Backend, Executable, Tensor};
use opgraph::DType;

use crate::case::CaseContext;
use crate::recording_backend::RecordingBackend;
use crate::runner::SuiteOptions;
use crate::tolerance::ToleranceBits;

fn open(options: &SuiteOptions) -> Backend {
    let ctx = CaseContext::new(options.backend(), "api_invariants", ToleranceBits::default());
    match options.open_backend(&ctx) {
        Ok(backend) => backend,
        Err(failure) => panic!("{failure}"),
    }
}

fn minimum_f32(backend: &Backend) -> Executable {
    let a = graph::parameter(DType::F32, [2, 2]);
    let b = graph::parameter(DType::F32, [2, 2]);
    let result = graph::minimum(&a, &b).unwrap();
    let graph = Graph::new(vec![result], vec![a, b]).unwrap();
    backend.compile(&graph).unwrap()
}

fn f32_tensor(backend: &Backend, values: &[f32]) -> Tensor {
    let mut tensor = backend.create_tensor(DType::F32, [2, 2]).unwrap();
    backend.copy_data(&mut tensor, values).unwrap();
    tensor
}

fn expect_error_mentioning<E: Display>(result: Result<(), E>, needle: &str) {
    match result {
        Ok(()) => panic!("expected an error mentioning '{needle}'"),
        Err(err) => {
            let message = format!("{err:#}");
            assert!(
                message.contains(needle),
                "error '{message}' does not mention '{needle}'"
            );
        }
    }
}

pub fn call_with_validate_rejects_output_shape_mismatch(options: &SuiteOptions) {
    let backend = open(options);
    let executable = minimum_f32(&backend);
    let a = f32_tensor(&backend, &[1.0, 2.0, 3.0, 4.0]);
    let b = f32_tensor(&backend, &[4.0, 3.0, 2.0, 1.0]);
    let mut output = backend.create_tensor(DType::F32, [4]).unwrap();
    let result = executable.call_with_validate(&mut [&mut output], &[&a, &b]);
    expect_error_mentioning(result, "shape");
    assert_eq!(output.shape().dims(), &[4]);
}

pub fn call_with_validate_rejects_output_dtype_mismatch(options: &SuiteOptions) {
    let backend = open(options);
    let executable = minimum_f32(&backend);
    let a = f32_tensor(&backend, &[1.0, 2.0, 3.0, 4.0]);
    let b = f32_tensor(&backend, &[4.0, 3.0, 2.0, 1.0]);
    let mut output = backend.create_tensor(DType::Si32, [2, 2]).unwrap();
    let result = executable.call_with_validate(&mut [&mut output], &[&a, &b]);
    expect_error_mentioning(result, "dtype");
}

pub fn call_with_validate_rejects_wrong_binding_count(options: &SuiteOptions) {
    let backend = open(options);
    let executable = minimum_f32(&backend);
    let a = f32_tensor(&backend, &[1.0, 2.0, 3.0, 4.0]);
    let mut output = backend.create_tensor(DType::F32, [2, 2]).unwrap();
    let result = executable.call_with_validate(&mut [&mut output], &[&a]);
    expect_error_mentioning(result, "expected 2 input tensors, got 1");
}

pub fn call_with_validate_rejects_foreign_tensor(options: &SuiteOptions) {
    let backend = open(options);
    let executable = minimum_f32(&backend);
    let foreign = Backend::from_portable(RecordingBackend::default());
    let a = f32_tensor(&backend, &[1.0, 2.0, 3.0, 4.0]);
    let b = f32_tensor(&foreign, &[4.0, 3.0, 2.0, 1.0]);
    let mut output = backend.create_tensor(DType::F32, [2, 2]).unwrap();
    let result = executable.call_with_validate(&mut [&mut output], &[&a, &b]);
    expect_error_mentioning(result, RecordingBackend::NAME);
}

pub fn copy_data_rejects_length_mismatch(options: &SuiteOptions) {
    let backend = open(options);
    let mut tensor = backend.create_tensor(DType::F32, [2, 2]).unwrap();
    let result = backend.copy_data(&mut tensor, &[1.0f32, 2.0, 3.0]);
    assert!(result.is_err(), "three values copied into a 2x2 tensor");
    assert_eq!(
        backend.read_vector::<f32>(&tensor).unwrap(),
        vec![0.0; 4],
        "failed copy must leave the tensor untouched"
    );
}

pub fn copy_data_rejects_dtype_mismatch(options: &SuiteOptions) {
    let backend = open(options);
    let mut tensor = backend.create_tensor(DType::F32, [2, 2]).unwrap();
    let result = backend.copy_data(&mut tensor, &[1i32, 2, 3, 4]);
    expect_error_mentioning(result, "si32");
    assert!(backend.read_vector::<i32>(&tensor).is_err());
}

pub fn executable_is_reusable_across_calls(options: &SuiteOptions) {
    let backend = open(options);
    let executable = minimum_f32(&backend);
    let mut output = backend.create_tensor(DType::F32, [2, 2]).unwrap();

    let a = f32_tensor(&backend, &[1.0, 8.0, -3.0, 4.0]);
    let b = f32_tensor(&backend, &[2.0, 7.0, -4.0, 4.0]);
    executable
        .call_with_validate(&mut [&mut output], &[&a, &b])
        .unwrap();
    assert_eq!(
        backend.read_vector::<f32>(&output).unwrap(),
        vec![1.0, 7.0, -4.0, 4.0]
    );

    let c = f32_tensor(&backend, &[0.5, -0.5, 10.0, -10.0]);
    executable
        .call_with_validate(&mut [&mut output], &[&c, &a])
        .unwrap();
    assert_eq!(
        backend.read_vector::<f32>(&output).unwrap(),
        vec![0.5, -0.5, -3.0, -10.0]
    );
}

pub fn create_tensor_is_zero_initialised(options: &SuiteOptions) {
    let backend = open(options);
    let floats = backend.create_tensor(DType::F64, [3]).unwrap();
    assert_eq!(backend.read_vector::<f64>(&floats).unwrap(), vec![0.0; 3]);
    let ints = backend.create_tensor(DType::Ui32, [2, 3]).unwrap();
    assert_eq!(backend.read_vector::<u32>(&ints).unwrap(), vec![0; 6]);
    let scalar = backend.create_tensor(DType::Si64, opgraph::Shape::scalar()).unwrap();
    assert_eq!(backend.read_vector::<i64>(&scalar).unwrap(), vec![0]);
}
