//! A backend that computes the wrong operator must fail with the backend, case and element named.

use opgraph::backend::registry::register_portable_backend;
use opgraph::backend::spec::{
    BackendResult, ElementwiseBinaryOp, ElementwiseUnaryOp, Instruction, Operation,
    PortableBackend, TensorSpec, ValueId,
};
use opgraph_backend_interpreter::{
    CpuKernelInterceptor, CpuPortableBackend, CpuTensor, GenericCpuBackend,
};
use opgraph_backend_tests::cases::find_case;
use opgraph_backend_tests::config::ToleranceConfig;
use opgraph_backend_tests::runner::{run_case, CaseReport};
use opgraph_backend_tests::{run_suite, CaseFailure, CaseOutcome, SuiteOptions};

const MAX_FOR_MIN: &str = "swapped-minimum";
const SINH_FOR_COSH: &str = "swapped-cosh";

/// Runs `to` wherever the program asks for `from`.
struct SwapOperation {
    from: Operation,
    to: Operation,
}

impl CpuKernelInterceptor for SwapOperation {
    fn try_execute(
        &self,
        op: &Operation,
        inputs: &[CpuTensor],
        outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>> {
        if *op != self.from {
            return None;
        }
        let instruction = Instruction {
            id: ValueId(0),
            op: self.to.clone(),
            operands: Vec::new(),
            output: outputs.first()?.clone(),
        };
        Some(CpuPortableBackend::new().execute_instruction(&instruction, inputs))
    }
}

fn register_swapped_backends() {
    register_portable_backend(MAX_FOR_MIN, || {
        GenericCpuBackend::with_interceptor(SwapOperation {
            from: Operation::ElementwiseBinary(ElementwiseBinaryOp::Minimum),
            to: Operation::ElementwiseBinary(ElementwiseBinaryOp::Maximum),
        })
        .named(MAX_FOR_MIN)
    });
    register_portable_backend(SINH_FOR_COSH, || {
        GenericCpuBackend::with_interceptor(SwapOperation {
            from: Operation::ElementwiseUnary(ElementwiseUnaryOp::Cosh),
            to: Operation::ElementwiseUnary(ElementwiseUnaryOp::Sinh),
        })
        .named(SINH_FOR_COSH)
    });
}

fn options(backend: &str) -> SuiteOptions {
    SuiteOptions::new(backend)
        .setup(register_swapped_backends)
        .with_config(ToleranceConfig::default())
}

fn run(backend: &str, case: &str) -> CaseReport {
    run_case(&options(backend), find_case(case).unwrap())
}

fn expect_mismatch(report: CaseReport) -> (String, String, usize, String, String) {
    match report.outcome {
        CaseOutcome::Failed(CaseFailure::Mismatch {
            backend,
            case,
            index,
            expected,
            actual,
            ..
        }) => (backend, case, index, expected, actual),
        other => panic!("expected a mismatch, got {other:?}"),
    }
}

#[test]
fn unsigned_mismatch_names_the_element() {
    let (backend, case, index, expected, actual) =
        expect_mismatch(run(MAX_FOR_MIN, "minimum_unsigned_limit"));
    assert_eq!(backend, MAX_FOR_MIN);
    assert_eq!(case, "minimum_unsigned_limit");
    assert_eq!(index, 0);
    assert_eq!(expected, "10");
    assert_eq!(actual, u32::MAX.to_string());
}

#[test]
fn integer_mismatch_reports_the_first_differing_index() {
    let (backend, case, index, expected, actual) =
        expect_mismatch(run(MAX_FOR_MIN, "minimum_int32"));
    assert_eq!(backend, MAX_FOR_MIN);
    assert_eq!(case, "minimum_int32");
    assert_eq!(index, 1);
    assert_eq!(expected, "2");
    assert_eq!(actual, "8");
}

#[test]
fn float_mismatch_reports_values_outside_the_tolerance() {
    let report = run(SINH_FOR_COSH, "cosh");
    let message = match &report.outcome {
        CaseOutcome::Failed(failure) => failure.to_string(),
        other => panic!("expected a failure, got {other:?}"),
    };
    assert!(message.starts_with("[swapped-cosh] cosh: mismatch at index 0"), "{message}");

    let (backend, case, index, expected, actual) = expect_mismatch(report);
    assert_eq!(backend, SINH_FOR_COSH);
    assert_eq!(case, "cosh");
    assert_eq!(index, 0);
    let expected: f64 = expected.parse().unwrap();
    let actual: f64 = actual.parse().unwrap();
    assert_eq!(expected, f64::from(1.0f32.cosh()));
    assert!((actual - 1.0f64.sinh()).abs() < 1e-6, "actual {actual}");
}

#[test]
fn suite_report_counts_the_broken_cases() {
    let report = run_suite(&options(MAX_FOR_MIN).filter("minimum*"));
    assert_eq!(report.backend, MAX_FOR_MIN);
    assert_eq!(report.cases.len(), 4);
    assert_eq!(report.failed(), 4);
    assert!(!report.is_success());

    let report = run_suite(&options(MAX_FOR_MIN).filter("cosh*"));
    assert_eq!(report.passed(), 3);
    assert!(report.is_success());
}

#[test]
fn unknown_backends_fail_during_setup() {
    let report = run("not-registered", "cosh");
    match report.outcome {
        CaseOutcome::Failed(CaseFailure::Setup {
            backend, message, ..
        }) => {
            assert_eq!(backend, "not-registered");
            assert!(message.contains("not-registered"), "{message}");
        }
        other => panic!("expected a setup failure, got {other:?}"),
    }
}
