//! Graph front end: immutable operator DAGs with declared parameters and results.
//!
//! A [`Graph`] is built from node handles returned by the constructors in [`node`] and lowered
//! to a single-function [`Program`] that any registered backend can run.

mod node;

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::backend::spec::{
    BackendError, DType, Operand, Operation, Program, ProgramBuilder, Shape, TensorSpec, ValueId,
};

pub use node::{
    add, binary, constant, constant_values, cosh, maximum, minimum, parameter, unary, Node,
    NodeKind, NodeRef,
};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph must declare at least one result")]
    EmptyResults,
    #[error("declared parameter {index} is not a parameter node")]
    NotAParameter { index: usize },
    #[error("parameter {index} is declared more than once")]
    DuplicateParameter { index: usize },
    #[error("result depends on parameter {spec} that is not in the declared parameter list")]
    UndeclaredParameter { spec: TensorSpec },
    #[error("{op}: operand dtypes differ ({lhs} vs {rhs})")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },
    #[error("{op}: operand shapes differ ({lhs} vs {rhs})")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },
    #[error("{op} does not support dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },
    #[error("constant payload of {byte_len} bytes does not fit {spec}")]
    InvalidConstant { spec: TensorSpec, byte_len: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Computation with an explicit parameter list and one or more results.
#[derive(Debug, Clone)]
pub struct Graph {
    results: Vec<NodeRef>,
    parameters: Vec<NodeRef>,
}

impl Graph {
    /// Validates and seals a graph.
    ///
    /// Fails on an empty result list, on duplicate or non-parameter entries in `parameters`, and
    /// when a result reaches a parameter missing from `parameters`.
    pub fn new(results: Vec<NodeRef>, parameters: Vec<NodeRef>) -> Result<Self, GraphError> {
        if results.is_empty() {
            return Err(GraphError::EmptyResults);
        }
        let mut declared = HashSet::with_capacity(parameters.len());
        for (index, param) in parameters.iter().enumerate() {
            if !param.is_parameter() {
                return Err(GraphError::NotAParameter { index });
            }
            if !declared.insert(param.id()) {
                return Err(GraphError::DuplicateParameter { index });
            }
        }

        for node in post_order(&results) {
            if node.is_parameter() && !declared.contains(&node.id()) {
                return Err(GraphError::UndeclaredParameter {
                    spec: node.spec().clone(),
                });
            }
        }

        Ok(Self {
            results,
            parameters,
        })
    }

    pub fn results(&self) -> &[NodeRef] {
        &self.results
    }

    pub fn parameters(&self) -> &[NodeRef] {
        &self.parameters
    }

    pub fn parameter_specs(&self) -> Vec<TensorSpec> {
        self.parameters.iter().map(|p| p.spec().clone()).collect()
    }

    pub fn result_specs(&self) -> Vec<TensorSpec> {
        self.results.iter().map(|r| r.spec().clone()).collect()
    }

    /// Lowers to a program whose entry function is `name`.
    ///
    /// Parameters take the first value ids in declaration order; every other node is emitted
    /// once, after its operands.
    pub fn lower(&self, name: &str) -> Result<Program, GraphError> {
        let mut builder = ProgramBuilder::new();
        let mut values: HashMap<u64, ValueId> = HashMap::new();

        for param in &self.parameters {
            let id = builder.add_parameter(param.spec().clone());
            values.insert(param.id(), id);
        }

        for node in post_order(&self.results) {
            if values.contains_key(&node.id()) {
                continue;
            }
            let value_of = |input: &NodeRef| -> Result<Operand, GraphError> {
                values
                    .get(&input.id())
                    .map(|id| Operand::Value(*id))
                    .ok_or_else(|| GraphError::UndeclaredParameter {
                        spec: input.spec().clone(),
                    })
            };
            let (op, operands) = match node.kind() {
                NodeKind::Parameter => {
                    return Err(GraphError::UndeclaredParameter {
                        spec: node.spec().clone(),
                    })
                }
                NodeKind::Constant(literal) => (Operation::Constant(literal.clone()), Vec::new()),
                NodeKind::Unary(op, input) => {
                    (Operation::ElementwiseUnary(*op), vec![value_of(input)?])
                }
                NodeKind::Binary(op, lhs, rhs) => (
                    Operation::ElementwiseBinary(*op),
                    vec![value_of(lhs)?, value_of(rhs)?],
                ),
            };
            let id = builder.emit(op, operands, node.spec().clone());
            values.insert(node.id(), id);
        }

        let mut result_ids = Vec::with_capacity(self.results.len());
        for result in &self.results {
            let id = values
                .get(&result.id())
                .copied()
                .ok_or_else(|| GraphError::UndeclaredParameter {
                    spec: result.spec().clone(),
                })?;
            result_ids.push(id);
        }

        let function = builder.finish(name, result_ids)?;
        tracing::debug!(
            function = name,
            instructions = function.body.len(),
            "lowered graph"
        );
        Ok(Program::new(name).with_functions(vec![function]))
    }
}

/// Distinct nodes reachable from `roots`, each after all of its inputs.
fn post_order(roots: &[NodeRef]) -> Vec<NodeRef> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<(NodeRef, bool)> = roots.iter().rev().map(|r| (r.clone(), false)).collect();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for input in node.inputs().into_iter().rev() {
            if !visited.contains(&input.id()) {
                stack.push((input.clone(), false));
            }
        }
    }
    order
}
