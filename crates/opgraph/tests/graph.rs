use opgraph::backend::spec::{ElementwiseUnaryOp, Operand, Operation};
use opgraph::graph::{self, Graph, GraphError, NodeKind};
use opgraph::{DType, Shape};

#[test]
fn binary_ops_require_matching_operands() {
    let a = graph::parameter(DType::F32, [2, 2]);
    let b = graph::parameter(DType::F64, [2, 2]);
    let c = graph::parameter(DType::F32, [4]);

    let err = graph::minimum(&a, &b).unwrap_err();
    assert!(matches!(
        err,
        GraphError::DTypeMismatch {
            op: "minimum",
            lhs: DType::F32,
            rhs: DType::F64
        }
    ));
    let err = graph::minimum(&a, &c).unwrap_err();
    assert_eq!(
        err.to_string(),
        "minimum: operand shapes differ (2x2 vs 4)"
    );
}

#[test]
fn cosh_is_float_only() {
    let ints = graph::parameter(DType::Si64, [3]);
    let err = graph::cosh(&ints).unwrap_err();
    assert!(matches!(
        err,
        GraphError::UnsupportedDType {
            op: "cosh",
            dtype: DType::Si64
        }
    ));
    let unsigned = graph::parameter(DType::Ui32, [3]);
    assert!(graph::unary(ElementwiseUnaryOp::Neg, &unsigned).is_err());
    assert!(graph::unary(ElementwiseUnaryOp::Neg, &ints).is_ok());
}

#[test]
fn minimum_accepts_every_numeric_dtype() {
    for dtype in [DType::F32, DType::F64, DType::Si32, DType::Si64, DType::Ui32] {
        let a = graph::parameter(dtype, [2]);
        let b = graph::parameter(dtype, [2]);
        let out = graph::minimum(&a, &b).unwrap();
        assert_eq!(out.dtype(), dtype);
        assert_eq!(out.shape(), &Shape::from([2]));
    }
}

#[test]
fn graph_construction_checks_the_parameter_list() {
    let a = graph::parameter(DType::F32, [2]);
    let b = graph::parameter(DType::F32, [2]);
    let sum = graph::add(&a, &b).unwrap();

    assert!(matches!(
        Graph::new(Vec::new(), vec![a.clone()]),
        Err(GraphError::EmptyResults)
    ));
    assert!(matches!(
        Graph::new(vec![sum.clone()], vec![a.clone()]),
        Err(GraphError::UndeclaredParameter { .. })
    ));
    assert!(matches!(
        Graph::new(vec![sum.clone()], vec![a.clone(), a.clone()]),
        Err(GraphError::DuplicateParameter { index: 1 })
    ));
    assert!(matches!(
        Graph::new(vec![sum.clone()], vec![a.clone(), sum.clone()]),
        Err(GraphError::NotAParameter { index: 1 })
    ));
    assert!(Graph::new(vec![sum], vec![a, b]).is_ok());
}

#[test]
fn lowering_follows_parameter_order_and_emits_shared_nodes_once() {
    let a = graph::parameter(DType::Si32, [3]);
    let b = graph::parameter(DType::Si32, [3]);
    let low = graph::minimum(&b, &a).unwrap();
    let doubled = graph::add(&low, &low).unwrap();
    let graph = Graph::new(vec![doubled], vec![a, b]).unwrap();

    let program = graph.lower("main").unwrap();
    let function = program.entry_function().unwrap();
    assert_eq!(function.parameter_ids.len(), 2);
    assert_eq!(function.body.len(), 2);

    let (pa, pb) = (function.parameter_ids[0], function.parameter_ids[1]);
    let min = &function.body[0];
    assert_eq!(min.op.label(), "elementwise_binary.minimum");
    assert_eq!(min.operands, vec![Operand::Value(pb), Operand::Value(pa)]);
    let add = &function.body[1];
    assert_eq!(add.operands, vec![Operand::Value(min.id), Operand::Value(min.id)]);
    assert_eq!(function.result_ids, vec![add.id]);
}

#[test]
fn constants_lower_to_constant_instructions() {
    let x = graph::parameter(DType::F64, [2]);
    let floor = graph::constant_values(Shape::new([2]), &[0.5f64, -0.5]).unwrap();
    let out = graph::minimum(&x, &floor).unwrap();
    assert!(matches!(floor.kind(), NodeKind::Constant(_)));

    let program = Graph::new(vec![out], vec![x]).unwrap().lower("main").unwrap();
    let function = program.entry_function().unwrap();
    assert!(matches!(function.body[0].op, Operation::Constant(_)));
    assert!(function.body[0].operands.is_empty());
}

#[test]
fn constant_values_must_fill_the_shape() {
    let err = graph::constant_values(Shape::new([3]), &[1u32, 2]).unwrap_err();
    assert!(matches!(err, GraphError::Backend(_)));
}

#[test]
fn results_may_be_parameters() {
    let x = graph::parameter(DType::F32, [1]);
    let graph = Graph::new(vec![x.clone()], vec![x]).unwrap();
    let program = graph.lower("identity").unwrap();
    let function = program.entry_function().unwrap();
    assert!(function.body.is_empty());
    assert_eq!(function.result_ids, function.parameter_ids);
}
