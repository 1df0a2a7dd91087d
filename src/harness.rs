//! End-to-end run: prerequisites, sequential execution, parsing, report.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::parser;
use crate::persist;
use crate::prereq::{CommandProbe, LibraryProbe, NoLibraries, PrerequisiteChecker};
use crate::runner::ProcessRunner;
use crate::schema::{BenchmarkRun, BenchmarkSpec, MetricSet, Report};
use crate::BenchmarkKind;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub struct Harness {
    config: HarnessConfig,
    specs: Vec<BenchmarkSpec>,
    runner: ProcessRunner,
    probe: Box<dyn LibraryProbe>,
    libraries: Vec<String>,
}

impl Harness {
    pub fn from_config(config: HarnessConfig) -> Result<Self> {
        let specs = config.benchmark_specs()?;
        let runner = ProcessRunner::new(Some(config.timeout()?));

        let libraries = config.runtime.required_libraries();
        let probe_args = config.runtime.library_probe();
        let probe: Box<dyn LibraryProbe> = match (libraries.is_empty(), probe_args.is_empty()) {
            (true, _) => Box::new(NoLibraries),
            (false, false) => Box::new(CommandProbe::new(config.runtime.executable(), probe_args)),
            (false, true) => {
                return Err(HarnessError::InvalidConfig(
                    "required_libraries is set but library_probe is empty".to_string(),
                ))
            }
        };

        Ok(Self {
            config,
            specs,
            runner,
            probe,
            libraries,
        })
    }

    pub fn with_probe(mut self, probe: Box<dyn LibraryProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Keeps only the named benchmarks, preserving configured order.
    pub fn retain(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let unknown: Vec<&str> = names
            .iter()
            .filter(|n| !self.specs.iter().any(|s| &s.name == *n))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(HarnessError::InvalidConfig(format!(
                "unknown benchmark(s): {}",
                unknown.join(", ")
            )));
        }
        self.specs.retain(|s| names.contains(&s.name));
        Ok(())
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn specs(&self) -> &[BenchmarkSpec] {
        &self.specs
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output.path
    }

    pub fn check_prerequisites(&self) -> Result<()> {
        let mut checker = PrerequisiteChecker::for_specs(&self.specs, self.probe.as_ref());
        checker.require_libraries(self.libraries.iter().cloned());
        checker.check()
    }

    /// Runs every benchmark one after another and parses each output.
    /// Benchmark failures are recorded, never returned.
    pub fn execute(&self) -> Vec<BenchmarkRun> {
        let total = self.specs.len();
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                tracing::info!(
                    benchmark = %spec.name,
                    kind = %spec.kind,
                    "running {}/{}",
                    i + 1,
                    total
                );
                let result = self.runner.run(spec);
                let metrics = parser::parse(spec.kind, &result.raw_output);
                let absent = absent_metrics(spec.kind, &metrics);
                tracing::debug!(
                    benchmark = %spec.name,
                    metrics = metrics.len(),
                    absent = %absent.join(","),
                    "parsed output"
                );
                BenchmarkRun {
                    spec: spec.clone(),
                    result,
                    metrics,
                }
            })
            .collect()
    }

    /// Full pipeline. Only prerequisite and persistence failures are errors.
    pub fn run(&self) -> Result<Report> {
        self.check_prerequisites()?;
        tracing::info!(
            benchmarks = self.specs.len(),
            timeout_secs = self.runner.timeout().map(|t| t.as_secs_f64()),
            "prerequisites met; starting benchmarks"
        );
        let runs = self.execute();
        let report = Report::aggregate(self.config.snapshot(), Utc::now(), runs);
        persist::persist_report(&report, self.output_path())?;
        Ok(report)
    }
}

/// Metrics the kind's rules know about that `metrics` lacks.
pub fn absent_metrics(kind: BenchmarkKind, metrics: &MetricSet) -> Vec<&'static str> {
    parser::metric_names(kind)
        .into_iter()
        .filter(|name| !metrics.contains(name))
        .collect()
}

/// Config file named on the command line, else the discovered one, else defaults.
pub fn load_config(explicit: Option<&PathBuf>) -> Result<HarnessConfig> {
    match explicit {
        Some(path) => HarnessConfig::load(path),
        None => match HarnessConfig::discover() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using discovered config");
                HarnessConfig::load(path)
            }
            None => Ok(HarnessConfig::default()),
        },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::persist::load_report;
    use crate::schema::ExecutionStatus;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn shell_spec(name: &str, kind: BenchmarkKind, script: &str) -> BenchmarkSpec {
        BenchmarkSpec {
            name: name.to_string(),
            kind,
            executable: "sh".to_string(),
            entry_point: None,
            args: vec!["-c".to_string(), script.to_string()],
            runtime_flags: vec![],
        }
    }

    fn config_with(specs: Vec<BenchmarkSpec>, out: PathBuf) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.benchmarks = specs;
        config.output.path = out;
        config.runtime.required_libraries = Some(Vec::new());
        config.runner.timeout = "20s".to_string();
        config
    }

    #[test]
    fn test_run_records_every_benchmark() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("report.json");
        let specs = vec![
            shell_spec(
                "fibonacci",
                BenchmarkKind::Fibonacci,
                "echo '递归方法: 结果 = 102334155, 用时 = 0.482931 秒'",
            ),
            shell_spec("memory", BenchmarkKind::Memory, "echo crashed >&2; exit 134"),
            shell_spec("file_io", BenchmarkKind::FileIo, "echo '写入速度: 81.00 MB/秒'; exit 1"),
        ];

        let harness = Harness::from_config(config_with(specs, out.clone())).unwrap();
        let report = harness.run().unwrap();

        assert_eq!(report.raw_results().len(), 3);
        assert_eq!(report.parsed_results().len(), 3);
        assert!(report.raw_results().values().all(|r| r.duration_seconds >= 0.0));
        assert_eq!(
            report.parsed_results()["fibonacci"].get("recursive_time"),
            Some(0.482931)
        );
        assert!(report.parsed_results()["memory"].is_empty());
        assert_eq!(
            report.parsed_results()["file_io"].get("write_speed"),
            Some(81.0)
        );
        assert_eq!(report.failures().count(), 2);

        assert_eq!(load_report(&out).unwrap(), report);
    }

    #[test]
    fn test_missing_entry_point_blocks_all_execution() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("ran");
        let first = shell_spec(
            "fibonacci",
            BenchmarkKind::Fibonacci,
            &format!("touch {}", marker.display()),
        );
        let mut second = shell_spec("memory", BenchmarkKind::Memory, "true");
        second.entry_point = Some(dir.path().join("missing_memory_test.js"));

        let out = dir.path().join("report.json");
        let harness = Harness::from_config(config_with(vec![first, second], out.clone())).unwrap();
        let err = harness.run().unwrap_err();

        match err {
            HarnessError::Configuration { missing } => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].contains("missing_memory_test.js"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!marker.exists(), "a benchmark ran despite failed prerequisites");
        assert!(!out.exists());
    }

    #[test]
    fn test_failed_library_probe_is_fatal() {
        let dir = tempdir().unwrap();
        let mut config = config_with(
            vec![shell_spec("fibonacci", BenchmarkKind::Fibonacci, "true")],
            dir.path().join("r.json"),
        );
        config.runtime.required_libraries = Some(vec!["mathjs".to_string()]);

        let harness = Harness::from_config(config)
            .unwrap()
            .with_probe(Box::new(|_: &str| false));
        let err = harness.check_prerequisites().unwrap_err();
        assert!(err.to_string().contains("mathjs"));
    }

    #[test]
    fn test_retain_filters_and_rejects_unknown() {
        let dir = tempdir().unwrap();
        let specs = vec![
            shell_spec("fibonacci", BenchmarkKind::Fibonacci, "true"),
            shell_spec("memory", BenchmarkKind::Memory, "true"),
        ];
        let mut harness = Harness::from_config(config_with(specs, dir.path().join("r.json"))).unwrap();

        assert!(harness.retain(&["nope".to_string()]).is_err());
        harness.retain(&["memory".to_string()]).unwrap();
        assert_eq!(harness.specs().len(), 1);
        assert_eq!(harness.specs()[0].name, "memory");
    }

    #[test]
    fn test_hung_benchmark_is_killed_and_run_continues() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("report.json");
        let specs = vec![
            shell_spec("memory", BenchmarkKind::Memory, "sleep 30"),
            shell_spec(
                "fibonacci",
                BenchmarkKind::Fibonacci,
                "echo '迭代方法: 结果 = 55, 用时 = 0.000001 秒'",
            ),
        ];
        let runner = ProcessRunner::new(Some(Duration::from_millis(300)))
            .with_drain_grace(Duration::from_millis(300));
        let harness = Harness::from_config(config_with(specs, out))
            .unwrap()
            .with_runner(runner);

        let report = harness.run().unwrap();
        let hung = &report.raw_results()["memory"];
        assert_eq!(hung.status, ExecutionStatus::Failure);
        assert!(hung.error_detail.as_deref().unwrap().contains("timed out"));
        assert!(hung.duration_seconds < 20.0);
        assert!(report.raw_results()["fibonacci"].is_success());
    }

    #[test]
    fn test_absent_metrics_lists_unmatched_rules() {
        let metrics = parser::parse(
            BenchmarkKind::Fibonacci,
            "递归方法: 结果 = 102334155, 用时 = 0.482931 秒",
        );
        assert_eq!(absent_metrics(BenchmarkKind::Fibonacci, &metrics), vec!["iterative_time"]);
        assert!(absent_metrics(BenchmarkKind::Http, &metrics).is_empty());
    }

    #[test]
    fn test_persist_failure_surfaces() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();

        let harness = Harness::from_config(config_with(
            vec![shell_spec("fibonacci", BenchmarkKind::Fibonacci, "true")],
            blocker.join("report.json"),
        ))
        .unwrap();
        assert!(matches!(harness.run(), Err(HarnessError::Persist { .. })));
    }
}
