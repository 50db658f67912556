use opgraph_backend_interpreter::register_interpreter_backends;
use opgraph_backend_tests::config::ToleranceConfig;
use opgraph_backend_tests::{run_suite, CaseOutcome, SuiteOptions};

#[test]
fn manifest_entries_skip_matching_cases() {
    let options = SuiteOptions::new("interpreter")
        .setup(register_interpreter_backends)
        .with_config(ToleranceConfig::default())
        .manifest("# not yet supported\ncosh*\nminimum_int64\n")
        .unwrap();
    let report = run_suite(&options);

    for case in &report.cases {
        let expected_pattern = match case.case {
            "cosh" | "cosh_f64" | "cosh_seeded" => Some("cosh*"),
            "minimum_int64" => Some("minimum_int64"),
            _ => None,
        };
        match (expected_pattern, &case.outcome) {
            (Some(expected), CaseOutcome::Skipped { pattern }) => assert_eq!(pattern, expected),
            (None, CaseOutcome::Passed) => {}
            (_, outcome) => panic!("{}: unexpected outcome {outcome:?}", case.case),
        }
    }
    assert_eq!(report.skipped(), 4);
    assert_eq!(report.passed(), 3);
    assert!(report.is_success());
    assert!(report
        .to_string()
        .contains("skipped (manifest: cosh*)"));
}

#[test]
fn skipped_cases_never_touch_the_backend() {
    let options = SuiteOptions::new("never-registered")
        .with_config(ToleranceConfig::default())
        .manifest("*")
        .unwrap();
    let report = run_suite(&options);
    assert_eq!(report.skipped(), report.cases.len());
    assert!(report.is_success());
}
