//! Runs cases against a named backend, honouring manifests and tolerance overrides.

use std::fmt;
use std::time::{Duration, Instant};

use opgraph::runtime::Backend;

use crate::case::{CaseContext, CaseFailure};
use crate::cases::{find_case, Case, CASES};
use crate::config::{tolerance_config, ToleranceConfig, ToleranceOverride};
use crate::env;
use crate::manifest::{Manifest, ManifestError};
use crate::tolerance::ToleranceBits;

/// Everything needed to run the suite on one backend.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    backend: String,
    manifest: Manifest,
    tolerance: ToleranceOverride,
    filter: Option<String>,
    config: Option<ToleranceConfig>,
    setup: Option<fn()>,
}

impl SuiteOptions {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            manifest: Manifest::empty(),
            tolerance: ToleranceOverride::default(),
            filter: None,
            config: None,
            setup: None,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn float_tolerance_bits(mut self, bits: u32) -> Self {
        self.tolerance.float_tolerance_bits = Some(bits);
        self
    }

    pub fn double_tolerance_bits(mut self, bits: u32) -> Self {
        self.tolerance.double_tolerance_bits = Some(bits);
        self
    }

    /// Parses manifest text; an unparsable manifest is reported when a case runs.
    pub fn manifest(self, src: &str) -> Result<Self, ManifestError> {
        Ok(self.with_manifest(Manifest::parse(src)?))
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Only cases matching this glob run.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Uses `config` instead of the process-wide tolerance config.
    pub fn with_config(mut self, config: ToleranceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Hook run before the backend is resolved, typically a registration function.
    pub fn setup(mut self, setup: fn()) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn resolve_tolerance(&self, case: &str) -> ToleranceBits {
        let config = match &self.config {
            Some(config) => config,
            None => tolerance_config(),
        };
        config.resolve(self.tolerance, &self.backend, case)
    }

    /// Runs the setup hook, then resolves the backend by name.
    pub fn open_backend(&self, ctx: &CaseContext) -> Result<Backend, CaseFailure> {
        if let Some(setup) = self.setup {
            setup();
        }
        Backend::create(&self.backend).map_err(|err| ctx.setup(err))
    }

    fn selects(&self, case: &str) -> bool {
        self.filter
            .as_deref()
            .is_none_or(|pattern| crate::config::matches_pattern(case, pattern))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Passed,
    Skipped { pattern: String },
    Failed(CaseFailure),
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub case: &'static str,
    pub outcome: CaseOutcome,
    pub tolerance: ToleranceBits,
    pub elapsed: Duration,
}

/// Results of a full suite run.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub backend: String,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Passed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&CaseOutcome) -> bool) -> usize {
        self.cases.iter().filter(|c| pred(&c.outcome)).count()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "backend {}", self.backend)?;
        for report in &self.cases {
            let status = match &report.outcome {
                CaseOutcome::Passed => "ok".to_string(),
                CaseOutcome::Skipped { pattern } => format!("skipped (manifest: {pattern})"),
                CaseOutcome::Failed(failure) => format!("FAILED: {failure}"),
            };
            writeln!(
                f,
                "  {:<24} {:>8.2?}  {}",
                report.case, report.elapsed, status
            )?;
        }
        write!(
            f,
            "{} passed, {} skipped, {} failed",
            self.passed(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Runs one case. Unknown names and unavailable backends are setup failures.
pub fn run_case(options: &SuiteOptions, case: &Case) -> CaseReport {
    let tolerance = options.resolve_tolerance(case.name);
    let started = Instant::now();
    let outcome = run_case_inner(options, case, tolerance);
    let report = CaseReport {
        case: case.name,
        outcome,
        tolerance,
        elapsed: started.elapsed(),
    };
    match &report.outcome {
        CaseOutcome::Passed => {
            tracing::debug!(backend = %options.backend, case = case.name, "case passed")
        }
        CaseOutcome::Skipped { pattern } => tracing::warn!(
            backend = %options.backend,
            case = case.name,
            pattern = %pattern,
            "case skipped by manifest"
        ),
        CaseOutcome::Failed(failure) => tracing::debug!(
            backend = %options.backend,
            case = case.name,
            error = %failure,
            "case failed"
        ),
    }
    report
}

fn run_case_inner(options: &SuiteOptions, case: &Case, tolerance: ToleranceBits) -> CaseOutcome {
    if !env::ignore_manifest() {
        if let Some(pattern) = options.manifest.skip_reason(case.name) {
            return CaseOutcome::Skipped {
                pattern: pattern.to_string(),
            };
        }
    }
    let ctx = CaseContext::new(options.backend.clone(), case.name, tolerance);
    let backend = match options.open_backend(&ctx) {
        Ok(backend) => backend,
        Err(failure) => return CaseOutcome::Failed(failure),
    };
    match (case.run)(&backend, &ctx) {
        Ok(()) => CaseOutcome::Passed,
        Err(failure) => CaseOutcome::Failed(failure),
    }
}

/// Runs every selected case in table order.
pub fn run_suite(options: &SuiteOptions) -> SuiteReport {
    let cases = CASES
        .iter()
        .filter(|case| options.selects(case.name))
        .map(|case| run_case(options, case))
        .collect();
    SuiteReport {
        backend: options.backend.clone(),
        cases,
    }
}

/// Entry point for tests generated by `define_backend_tests!`: panics on failure.
pub fn run_case_test(options: Result<SuiteOptions, ManifestError>, name: &str) {
    crate::init_test_logging();
    let options = match options {
        Ok(options) => options,
        Err(err) => panic!("invalid backend test configuration: {err}"),
    };
    let Some(case) = find_case(name) else {
        panic!("unknown conformance case '{name}'");
    };
    let report = run_case(&options, case);
    // Skips are already logged by `run_case`.
    if let CaseOutcome::Failed(failure) = report.outcome {
        panic!("{failure} [tolerance {}]", report.tolerance);
    }
}
