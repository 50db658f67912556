//! Kept in its own test binary: the flag is read once per process.

use opgraph_backend_interpreter::register_interpreter_backends;
use opgraph_backend_tests::config::ToleranceConfig;
use opgraph_backend_tests::{run_suite, SuiteOptions};

#[test]
fn ignore_manifest_runs_every_case() {
    std::env::set_var("OPGRAPH_IGNORE_MANIFEST", "1");
    let options = SuiteOptions::new("interpreter")
        .setup(register_interpreter_backends)
        .with_config(ToleranceConfig::default())
        .manifest("*")
        .unwrap();
    let report = run_suite(&options);
    assert_eq!(report.skipped(), 0);
    assert_eq!(report.passed(), report.cases.len());
}
