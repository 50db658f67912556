use opgraph::backend::spec::{
    ElementwiseBinaryOp, PortableBackend, Program, SpecErrorCode, TensorInit, TensorLiteral,
};
use opgraph::graph::{self, Graph, NodeRef};
use opgraph::runtime::{Backend, Element};
use opgraph::{DType, Shape};
use opgraph_backend_interpreter::{
    CpuPortableBackend, CpuTensor, TensorData, WidenedPrecisionBackend,
};
use opgraph_backend_tests::tolerance::{all_close_f32, close_f32, close_f64};
use proptest::prelude::*;

fn run_binary<T: Element>(
    backend: &Backend,
    build: fn(&NodeRef, &NodeRef) -> Result<NodeRef, opgraph::GraphError>,
    a: &[T],
    b: &[T],
) -> anyhow::Result<Vec<T>> {
    let shape = Shape::new([a.len()]);
    let lhs = graph::parameter(T::DTYPE, shape.clone());
    let rhs = graph::parameter(T::DTYPE, shape.clone());
    let result = build(&lhs, &rhs)?;
    let graph = Graph::new(vec![result], vec![lhs, rhs])?;
    let executable = backend.compile(&graph)?;

    let mut ta = backend.create_tensor(T::DTYPE, shape.clone())?;
    backend.copy_data(&mut ta, a)?;
    let mut tb = backend.create_tensor(T::DTYPE, shape.clone())?;
    backend.copy_data(&mut tb, b)?;
    let mut out = backend.create_tensor(T::DTYPE, shape)?;
    executable.call_with_validate(&mut [&mut out], &[&ta, &tb])?;
    backend.read_vector(&out)
}

fn run_cosh<T: Element>(backend: &Backend, x: &[T]) -> anyhow::Result<Vec<T>> {
    let shape = Shape::new([x.len()]);
    let input = graph::parameter(T::DTYPE, shape.clone());
    let graph = Graph::new(vec![graph::cosh(&input)?], vec![input])?;
    let executable = backend.compile(&graph)?;
    let mut tx = backend.create_tensor(T::DTYPE, shape.clone())?;
    backend.copy_data(&mut tx, x)?;
    let mut out = backend.create_tensor(T::DTYPE, shape)?;
    executable.call_with_validate(&mut [&mut out], &[&tx])?;
    backend.read_vector(&out)
}

fn interpreter() -> Backend {
    Backend::from_portable(CpuPortableBackend::new())
}

fn divide(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef, opgraph::GraphError> {
    graph::binary(ElementwiseBinaryOp::Div, lhs, rhs)
}

fn lowered_divide(dtype: DType, len: usize) -> Program {
    let a = graph::parameter(dtype, [len]);
    let b = graph::parameter(dtype, [len]);
    let result = divide(&a, &b).unwrap();
    Graph::new(vec![result], vec![a, b])
        .unwrap()
        .lower("main")
        .unwrap()
}

proptest! {
    #[test]
    fn minimum_matches_std_for_i32(pairs in prop::collection::vec(any::<(i32, i32)>(), 1..64)) {
        let (a, b): (Vec<i32>, Vec<i32>) = pairs.into_iter().unzip();
        let expected: Vec<i32> = a.iter().zip(&b).map(|(x, y)| *x.min(y)).collect();
        prop_assert_eq!(run_binary(&interpreter(), graph::minimum, &a, &b).unwrap(), expected);
    }

    #[test]
    fn minimum_matches_std_for_i64(pairs in prop::collection::vec(any::<(i64, i64)>(), 1..64)) {
        let (a, b): (Vec<i64>, Vec<i64>) = pairs.into_iter().unzip();
        let expected: Vec<i64> = a.iter().zip(&b).map(|(x, y)| *x.min(y)).collect();
        prop_assert_eq!(run_binary(&interpreter(), graph::minimum, &a, &b).unwrap(), expected);
    }

    #[test]
    fn minimum_matches_std_for_u32(pairs in prop::collection::vec(any::<(u32, u32)>(), 1..64)) {
        let (a, b): (Vec<u32>, Vec<u32>) = pairs.into_iter().unzip();
        let expected: Vec<u32> = a.iter().zip(&b).map(|(x, y)| *x.min(y)).collect();
        prop_assert_eq!(run_binary(&interpreter(), graph::minimum, &a, &b).unwrap(), expected);
    }

    #[test]
    fn minimum_is_commutative_for_finite_f64(
        pairs in prop::collection::vec((-1e12f64..1e12, -1e12f64..1e12), 1..64)
    ) {
        let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let backend = interpreter();
        let ab = run_binary(&backend, graph::minimum, &a, &b).unwrap();
        let ba = run_binary(&backend, graph::minimum, &b, &a).unwrap();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn cosh_f32_tracks_a_double_precision_reference(
        x in prop::collection::vec(-10.0f32..10.0, 1..64)
    ) {
        let actual = run_cosh(&interpreter(), &x).unwrap();
        for (value, got) in x.iter().zip(&actual) {
            let reference = f64::from(*value).cosh() as f32;
            prop_assert!(
                close_f32(reference, *got, 2, 0.0),
                "cosh({}) = {}, reference {}", value, got, reference
            );
        }
    }

    #[test]
    fn cosh_f64_is_even(x in prop::collection::vec(-20.0f64..20.0, 1..64)) {
        let negated: Vec<f64> = x.iter().map(|v| -v).collect();
        let backend = interpreter();
        let pos = run_cosh(&backend, &x).unwrap();
        let neg = run_cosh(&backend, &negated).unwrap();
        for (p, n) in pos.iter().zip(&neg) {
            prop_assert!(close_f64(*p, *n, 0, 0.0));
            prop_assert!(*p >= 1.0);
        }
    }
}

#[test]
fn minimum_propagates_the_second_operand_when_unordered() {
    let out = run_binary(
        &interpreter(),
        graph::minimum,
        &[f32::NAN, 1.0, -0.0],
        &[1.0, f32::NAN, 0.0],
    )
    .unwrap();
    assert_eq!(out[0], 1.0);
    assert!(out[1].is_nan());
    assert_eq!(out[2].to_bits(), 0.0f32.to_bits());
}

#[test]
fn integer_arithmetic_wraps() {
    let out = run_binary(&interpreter(), graph::add, &[i32::MAX, -1], &[1, i32::MIN]).unwrap();
    assert_eq!(out, vec![i32::MIN, i32::MAX]);
    let out = run_binary(&interpreter(), divide, &[i64::MIN, 7], &[-1, 2]).unwrap();
    assert_eq!(out, vec![i64::MIN, 3]);
}

#[test]
fn integer_division_by_zero_is_reported_with_its_location() {
    let backend = CpuPortableBackend::new();
    let program = lowered_divide(DType::Si32, 3);
    let lhs = backend
        .materialize(TensorInit::Literal(
            TensorLiteral::from_values(Shape::new([3]), &[4i32, 5, 6]).unwrap(),
        ))
        .unwrap();
    let rhs = backend
        .materialize(TensorInit::Literal(
            TensorLiteral::from_values(Shape::new([3]), &[2i32, 0, 3]).unwrap(),
        ))
        .unwrap();

    let err = backend.run_program(&program, &[lhs, rhs]).unwrap_err();
    assert_eq!(err.spec_code(), Some(&SpecErrorCode::IntegerDivideByZero));
    let message = err.to_string();
    assert!(message.contains("element 1"), "{message}");
    assert!(message.contains("function `main` instruction #0"), "{message}");
    assert!(message.contains("elementwise_binary.div"), "{message}");
}

#[test]
fn float_division_by_zero_follows_ieee() {
    let out = run_binary(&interpreter(), divide, &[1.0f64, -1.0, 0.0], &[0.0, 0.0, 0.0]).unwrap();
    assert_eq!(out[0], f64::INFINITY);
    assert_eq!(out[1], f64::NEG_INFINITY);
    assert!(out[2].is_nan());
}

#[test]
fn run_program_rejects_mismatched_entry_inputs() {
    let backend = CpuPortableBackend::new();
    let program = lowered_divide(DType::F32, 2);
    let wrong = CpuTensor::zeroed(&opgraph::TensorSpec::new(DType::F32, Shape::new([3]))).unwrap();
    let err = backend
        .run_program(&program, &[wrong.clone(), wrong.clone()])
        .unwrap_err();
    assert_eq!(err.spec_code(), Some(&SpecErrorCode::ShapeMismatch));

    let err = backend.run_program(&program, &[wrong]).unwrap_err();
    assert_eq!(err.spec_code(), Some(&SpecErrorCode::ArityMismatch));
}

#[test]
fn widened_backend_agrees_with_plain_interpreter_within_a_few_ulps() {
    let x: Vec<f32> = (-40..=40).map(|i| i as f32 * 0.25).collect();
    let plain = run_cosh(&interpreter(), &x).unwrap();
    let wide = run_cosh(&Backend::from_portable(WidenedPrecisionBackend::widened()), &x).unwrap();
    let report = all_close_f32(&plain, &wide, 2, 0.0).unwrap();
    assert!(report.passed(), "{report}");
}

#[test]
fn widened_backend_reports_its_own_name() {
    let backend = Backend::from_portable(WidenedPrecisionBackend::widened());
    assert_eq!(backend.name(), opgraph_backend_interpreter::WIDENED_BACKEND_NAME);
}

#[test]
fn zeroed_tensors_have_typed_storage() {
    let spec = opgraph::TensorSpec::new(DType::Ui32, Shape::new([2, 2]));
    let tensor = CpuTensor::zeroed(&spec).unwrap();
    assert_eq!(tensor.data, TensorData::Ui32(vec![0u32; 4].into()));
    assert_eq!(tensor.to_literal(), TensorLiteral::zeroed(spec).unwrap());
}
