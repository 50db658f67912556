//! The conformance case table shared by `define_backend_tests!` and the CLI.

mod cosh;
mod minimum;

use opgraph::runtime::Backend;

use crate::case::{CaseContext, CaseFailure};

pub type CaseFn = fn(&Backend, &CaseContext) -> Result<(), CaseFailure>;

#[derive(Debug, Clone, Copy)]
pub struct Case {
    pub name: &'static str,
    pub description: &'static str,
    pub run: CaseFn,
}

/// Every shipped case. Names are stable; manifests and tolerance rules refer to them.
pub static CASES: &[Case] = &[
    Case {
        name: "cosh",
        description: "cosh over f32 {6}, including signed zeros",
        run: cosh::cosh,
    },
    Case {
        name: "cosh_f64",
        description: "cosh over f64 {6}",
        run: cosh::cosh_f64,
    },
    Case {
        name: "cosh_seeded",
        description: "cosh over 64 seeded random f32 values in [-10, 10]",
        run: cosh::cosh_seeded,
    },
    Case {
        name: "minimum",
        description: "elementwise minimum over f32 {2,2,2}",
        run: minimum::minimum,
    },
    Case {
        name: "minimum_int32",
        description: "elementwise minimum over i32 {2,2,2}",
        run: minimum::minimum_int32,
    },
    Case {
        name: "minimum_int64",
        description: "elementwise minimum over i64 {2,2,2}",
        run: minimum::minimum_int64,
    },
    Case {
        name: "minimum_unsigned_limit",
        description: "minimum(u32::MAX, 10) on a scalar",
        run: minimum::minimum_unsigned_limit,
    },
];

pub fn find_case(name: &str) -> Option<&'static Case> {
    CASES.iter().find(|case| case.name == name)
}

pub fn case_names() -> impl Iterator<Item = &'static str> {
    CASES.iter().map(|case| case.name)
}
