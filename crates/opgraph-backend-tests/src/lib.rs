pub mod api_invariants;
pub mod case;
pub mod cases;
pub mod config;
mod env;
pub mod manifest;
pub mod recording_backend;
pub mod runner;
pub mod tolerance;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use case::{CaseContext, CaseFailure};
pub use cases::{Case, CASES};
pub use manifest::Manifest;
pub use runner::{run_suite, CaseOutcome, SuiteOptions, SuiteReport};
pub use tolerance::ToleranceBits;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[doc(hidden)]
#[macro_export]
macro_rules! __suite_option {
    ($options:ident, manifest, $value:expr) => {
        $options.manifest($value)?
    };
    ($options:ident, $key:ident, $value:expr) => {
        $options.$key($value)
    };
}

/// Generates one `#[test]` per conformance case for the backend registered as `$backend`.
///
/// Optional settings: `setup = fn()`, `float_tolerance_bits = u32`,
/// `double_tolerance_bits = u32`, `manifest = &str` (usually `include_str!`).
///
/// ```ignore
/// opgraph_backend_tests::define_backend_tests!(
///     interpreter,
///     "interpreter",
///     setup = opgraph_backend_interpreter::register_interpreter_backends,
///     manifest = include_str!("../unit_test.manifest"),
/// );
/// ```
#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;

            fn options(
            ) -> ::std::result::Result<$crate::runner::SuiteOptions, $crate::manifest::ManifestError>
            {
                let options = $crate::runner::SuiteOptions::new($backend);
                $( let options = $crate::__suite_option!(options, $key, $value); )*
                Ok(options)
            }

            fn suite() -> $crate::runner::SuiteOptions {
                match options() {
                    Ok(options) => options,
                    Err(err) => panic!("invalid backend test configuration: {err}"),
                }
            }

            const LISTED_CASES: &[&str] = &[
                "cosh",
                "cosh_f64",
                "cosh_seeded",
                "minimum",
                "minimum_int32",
                "minimum_int64",
                "minimum_unsigned_limit",
            ];

            macro_rules! case_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        $crate::runner::run_case_test(options(), stringify!($name));
                    }
                };
            }

            case_test!(cosh);
            case_test!(cosh_f64);
            case_test!(cosh_seeded);
            case_test!(minimum);
            case_test!(minimum_int32);
            case_test!(minimum_int64);
            case_test!(minimum_unsigned_limit);

            #[test]
            fn every_case_has_a_test() {
                let table: ::std::vec::Vec<&str> = $crate::cases::case_names().collect();
                assert_eq!(table, LISTED_CASES);
            }

            macro_rules! invariant_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        $crate::init_test_logging();
                        $crate::api_invariants::$name(&suite());
                    }
                };
            }

            invariant_test!(call_with_validate_rejects_output_shape_mismatch);
            invariant_test!(call_with_validate_rejects_output_dtype_mismatch);
            invariant_test!(call_with_validate_rejects_wrong_binding_count);
            invariant_test!(call_with_validate_rejects_foreign_tensor);
            invariant_test!(copy_data_rejects_length_mismatch);
            invariant_test!(copy_data_rejects_dtype_mismatch);
            invariant_test!(executable_is_reusable_across_calls);
            invariant_test!(create_tensor_is_zero_initialised);
        }
    };
}
