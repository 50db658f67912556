//! Immutable graph nodes and the constructors that infer their output specs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::backend::spec::{
    DType, ElementwiseBinaryOp, ElementwiseUnaryOp, Shape, TensorLiteral, TensorSpec,
};
use crate::runtime::element::Element;

use super::GraphError;

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Shared handle to a node. Nodes are never mutated once built.
pub type NodeRef = Arc<Node>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Placeholder bound to a caller-supplied tensor at call time.
    Parameter,
    Constant(TensorLiteral),
    Unary(ElementwiseUnaryOp, NodeRef),
    Binary(ElementwiseBinaryOp, NodeRef, NodeRef),
}

#[derive(Debug, PartialEq)]
pub struct Node {
    id: u64,
    kind: NodeKind,
    spec: TensorSpec,
}

impl Node {
    /// Process-unique identity; two nodes with equal ids are the same node.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
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

    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, NodeKind::Parameter)
    }

    /// Direct operands in evaluation order.
    pub fn inputs(&self) -> Vec<&NodeRef> {
        match &self.kind {
            NodeKind::Parameter | NodeKind::Constant(_) => Vec::new(),
            NodeKind::Unary(_, input) => vec![input],
            NodeKind::Binary(_, lhs, rhs) => vec![lhs, rhs],
        }
    }

    fn build(kind: NodeKind, spec: TensorSpec) -> NodeRef {
        Arc::new(Node {
            id: next_node_id(),
            kind,
            spec,
        })
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.kind {
            NodeKind::Parameter => "parameter",
            NodeKind::Constant(_) => "constant",
            NodeKind::Unary(op, _) => op.name(),
            NodeKind::Binary(op, _, _) => op.name(),
        };
        write!(f, "{label}#{} : {}", self.id, self.spec)
    }
}

/// Declares a parameter placeholder.
pub fn parameter(dtype: DType, shape: impl Into<Shape>) -> NodeRef {
    Node::build(NodeKind::Parameter, TensorSpec::new(dtype, shape.into()))
}

/// Embeds a literal in the graph.
pub fn constant(literal: TensorLiteral) -> Result<NodeRef, GraphError> {
    if Some(literal.byte_len()) != literal.spec.byte_len() {
        return Err(GraphError::InvalidConstant {
            spec: literal.spec.clone(),
            byte_len: literal.byte_len(),
        });
    }
    let spec = literal.spec.clone();
    Ok(Node::build(NodeKind::Constant(literal), spec))
}

/// Embeds typed host values as a constant.
pub fn constant_values<T: Element>(
    shape: impl Into<Shape>,
    values: &[T],
) -> Result<NodeRef, GraphError> {
    let literal = TensorLiteral::from_values(shape.into(), values)?;
    constant(literal)
}

pub fn unary(op: ElementwiseUnaryOp, input: &NodeRef) -> Result<NodeRef, GraphError> {
    let dtype = input.dtype();
    let supported = if op.requires_float() {
        dtype.is_float()
    } else {
        dtype.is_float() || dtype.is_signed_integer()
    };
    if !supported {
        return Err(GraphError::UnsupportedDType {
            op: op.name(),
            dtype,
        });
    }
    Ok(Node::build(
        NodeKind::Unary(op, Arc::clone(input)),
        input.spec().clone(),
    ))
}

/// Binary elementwise op. Operands must agree exactly; there is no implicit broadcasting.
pub fn binary(op: ElementwiseBinaryOp, lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef, GraphError> {
    if lhs.dtype() != rhs.dtype() {
        return Err(GraphError::DTypeMismatch {
            op: op.name(),
            lhs: lhs.dtype(),
            rhs: rhs.dtype(),
        });
    }
    if lhs.shape() != rhs.shape() {
        return Err(GraphError::ShapeMismatch {
            op: op.name(),
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }
    if !lhs.dtype().is_numeric() {
        return Err(GraphError::UnsupportedDType {
            op: op.name(),
            dtype: lhs.dtype(),
        });
    }
    Ok(Node::build(
        NodeKind::Binary(op, Arc::clone(lhs), Arc::clone(rhs)),
        lhs.spec().clone(),
    ))
}

pub fn cosh(input: &NodeRef) -> Result<NodeRef, GraphError> {
    unary(ElementwiseUnaryOp::Cosh, input)
}

pub fn minimum(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef, GraphError> {
    binary(ElementwiseBinaryOp::Minimum, lhs, rhs)
}

pub fn maximum(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef, GraphError> {
    binary(ElementwiseBinaryOp::Maximum, lhs, rhs)
}

pub fn add(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef, GraphError> {
    binary(ElementwiseBinaryOp::Add, lhs, rhs)
}
