extern crate self as opgraph;

pub mod backend;
pub mod graph;
pub mod runtime;

pub use backend::spec::{DType, PortableBackend, Shape, TensorSpec};
pub use graph::{Graph, GraphError, NodeRef};
pub use runtime::{Backend, Element, Executable, Tensor};
