use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runtime_perf_harness::config::{parse_duration, RuntimeConfig, RuntimePreset};
use runtime_perf_harness::harness::{absent_metrics, load_config, Harness};
use runtime_perf_harness::persist::load_report;
use runtime_perf_harness::schema::{ExecutionStatus, Report};
use runtime_perf_harness::{parser, BenchmarkKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Check prerequisites, run every benchmark and write the report (default).
    Run {
        /// Where to write the JSON report; overrides `[output] path`.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Runtime preset; replaces any `[runtime]` overrides from the config.
        #[arg(long, value_enum)]
        runtime: Option<RuntimePreset>,

        /// Per-benchmark timeout, e.g. "90s" or "10m".
        #[arg(long)]
        timeout: Option<String>,

        /// Only run the named benchmark. Can be provided multiple times.
        #[arg(long, value_name = "NAME", action = clap::ArgAction::Append)]
        only: Vec<String>,
    },

    /// Validate entry points and required libraries without running anything.
    Check {
        #[arg(long, value_enum)]
        runtime: Option<RuntimePreset>,
    },

    /// Extract metrics from a captured benchmark output file.
    Parse {
        #[arg(value_enum)]
        kind: BenchmarkKind,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Summarize a persisted report.
    Show {
        #[arg(value_name = "REPORT")]
        report: PathBuf,
    },

    /// Print a default perf-harness.toml.
    Init,
}

#[derive(Parser, Debug)]
#[command(name = "perf-harness")]
#[command(about = "Runs runtime micro-benchmarks as subprocesses and writes a JSON report")]
#[command(version)]
struct Args {
    /// Config file; defaults to the nearest perf-harness.toml.
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "perf_harness=debug,runtime_perf_harness=debug"
    } else {
        "perf_harness=info,runtime_perf_harness=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn select_runtime(runtime: &mut RuntimeConfig, preset: Option<RuntimePreset>) {
    if let Some(preset) = preset {
        *runtime = RuntimeConfig {
            preset,
            ..RuntimeConfig::default()
        };
    }
}

fn run(
    args: &Args,
    out: Option<PathBuf>,
    runtime: Option<RuntimePreset>,
    timeout: Option<String>,
    only: &[String],
) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    select_runtime(&mut config.runtime, runtime);
    if let Some(out) = out {
        config.output.path = out;
    }
    if let Some(timeout) = timeout {
        parse_duration(&timeout)?;
        config.runner.timeout = timeout;
    }

    let mut harness = Harness::from_config(config)?;
    harness.retain(only)?;
    tracing::info!(
        runtime = harness.config().runtime.preset.as_str(),
        benchmarks = harness.specs().len(),
        "starting run"
    );

    let report = harness.run()?;
    for (name, result) in report.failures() {
        tracing::warn!(
            benchmark = %name,
            detail = result.error_detail.as_deref().unwrap_or("unknown"),
            "benchmark failed"
        );
    }
    println!(
        "{} benchmark(s) run, {} failed; report written to {}",
        report.raw_results().len(),
        report.failures().count(),
        harness.output_path().display()
    );
    Ok(())
}

fn check(args: &Args, runtime: Option<RuntimePreset>) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    select_runtime(&mut config.runtime, runtime);
    let harness = Harness::from_config(config)?;
    harness.check_prerequisites()?;
    println!(
        "all prerequisites satisfied for {} benchmark(s)",
        harness.specs().len()
    );
    Ok(())
}

fn parse(kind: BenchmarkKind, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let metrics = parser::parse(kind, &raw);
    if metrics.is_empty() {
        tracing::warn!(kind = %kind, "no metrics recognized");
    }
    let absent = absent_metrics(kind, &metrics);
    if !absent.is_empty() {
        eprintln!("not found: {}", absent.join(", "));
    }
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn show(report: &Report) {
    println!(
        "report (schema v{}) from {}",
        report.schema_version(),
        report.timestamp().to_rfc3339()
    );
    for (key, value) in report.configuration() {
        println!("  {key} = {value}");
    }

    for (name, result) in report.raw_results() {
        let status = match result.status {
            ExecutionStatus::Success => "ok",
            ExecutionStatus::Failure => "FAILED",
        };
        println!();
        println!("{name}: {status} in {:.3}s", result.duration_seconds);
        if let Some(detail) = &result.error_detail {
            println!("  error: {detail}");
        }
        match report.parsed_results().get(name) {
            Some(metrics) if !metrics.is_empty() => {
                for (metric, value) in metrics.iter() {
                    println!("  {metric:<24} {value}");
                }
            }
            _ => println!("  (no metrics)"),
        }
    }
}

fn dispatch(args: &Args) -> Result<()> {
    match &args.cmd {
        None => run(args, None, None, None, &[]),
        Some(Command::Run {
            out,
            runtime,
            timeout,
            only,
        }) => run(args, out.clone(), *runtime, timeout.clone(), only),
        Some(Command::Check { runtime }) => check(args, *runtime),
        Some(Command::Parse { kind, file }) => parse(*kind, file),
        Some(Command::Show { report }) => {
            show(&load_report(report)?);
            Ok(())
        }
        Some(Command::Init) => {
            print!("{}", runtime_perf_harness::config::HarnessConfig::default_toml());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match dispatch(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
