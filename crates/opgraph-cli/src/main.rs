//! `opgraph`: run the backend conformance suite from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use opgraph::backend::registry::{list_backends, register_portable_backend};
use opgraph_backend_tests::cases::{find_case, CASES};
use opgraph_backend_tests::recording_backend::RecordingBackend;
use opgraph_backend_tests::{run_suite, Manifest, SuiteOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opgraph")]
#[command(about = "Operator conformance suite for opgraph backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered backends and the available cases
    ListBackends,

    /// Run the conformance suite against one backend
    Run {
        /// Registered backend name
        #[arg(short, long, default_value = opgraph_backend_interpreter::INTERPRETER_BACKEND_NAME)]
        backend: String,

        /// Manifest of cases to skip
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Bit tolerance for f32 comparisons
        #[arg(long)]
        float_tolerance_bits: Option<u32>,

        /// Bit tolerance for f64 comparisons
        #[arg(long)]
        double_tolerance_bits: Option<u32>,

        /// Only run cases matching this glob
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Print the program a case compiles
    Dump {
        /// Case name
        case: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
        format: DumpFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DumpFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    init_logging();
    opgraph_backend_interpreter::register_interpreter_backends();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::ListBackends => cmd_list(),
        Commands::Run {
            backend,
            manifest,
            float_tolerance_bits,
            double_tolerance_bits,
            filter,
        } => cmd_run(
            backend,
            manifest,
            float_tolerance_bits,
            double_tolerance_bits,
            filter,
        ),
        Commands::Dump {
            case,
            format,
            output,
        } => cmd_dump(&case, format, output),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_list() -> Result<bool> {
    println!("backends:");
    for name in list_backends() {
        println!("  {name}");
    }
    println!("cases:");
    for case in CASES {
        println!("  {:<24} {}", case.name, case.description);
    }
    Ok(true)
}

fn cmd_run(
    backend: String,
    manifest: Option<PathBuf>,
    float_tolerance_bits: Option<u32>,
    double_tolerance_bits: Option<u32>,
    filter: Option<String>,
) -> Result<bool> {
    let mut options = SuiteOptions::new(backend);
    if let Some(path) = manifest {
        let manifest = Manifest::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            entries = manifest.patterns().len(),
            "loaded manifest"
        );
        options = options.with_manifest(manifest);
    }
    if let Some(bits) = float_tolerance_bits {
        options = options.float_tolerance_bits(bits);
    }
    if let Some(bits) = double_tolerance_bits {
        options = options.double_tolerance_bits(bits);
    }
    if let Some(pattern) = filter {
        options = options.filter(pattern);
    }

    let report = run_suite(&options);
    if report.cases.is_empty() {
        bail!("no cases selected");
    }
    println!("{report}");
    Ok(report.is_success())
}

fn cmd_dump(case: &str, format: DumpFormat, output: Option<PathBuf>) -> Result<bool> {
    let case = find_case(case).with_context(|| format!("unknown case '{case}'"))?;

    let recorder = RecordingBackend::default();
    let registered = recorder.clone();
    register_portable_backend(RecordingBackend::NAME, move || registered.clone());

    // The recorder returns zeros, so the comparison is expected to fail.
    let report = run_suite(&SuiteOptions::new(RecordingBackend::NAME).filter(case.name));
    tracing::debug!(case = case.name, outcome = ?report.cases.first().map(|c| &c.outcome), "recorded case");

    let Some(program) = recorder.recorded_program() else {
        bail!("case '{}' did not compile a program", case.name);
    };
    let rendered = match format {
        DumpFormat::Text => program.to_text(),
        DumpFormat::Json => program.to_json_string()?,
    };
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => print!("{rendered}"),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "opgraph",
            "run",
            "--backend",
            "interpreter-wide",
            "--float-tolerance-bits",
            "3",
            "--filter",
            "cosh*",
        ])
        .unwrap();
        let Commands::Run {
            backend,
            float_tolerance_bits,
            filter,
            manifest,
            ..
        } = cli.command
        else {
            panic!("expected the run subcommand");
        };
        assert_eq!(backend, "interpreter-wide");
        assert_eq!(float_tolerance_bits, Some(3));
        assert_eq!(filter.as_deref(), Some("cosh*"));
        assert!(manifest.is_none());
    }
}
