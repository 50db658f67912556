//! Backend contract, program IR, and the name-keyed backend registry.

pub mod registry;
pub mod shape_helpers;
pub mod spec;
