use crate::BenchmarkKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bumped whenever the persisted report layout changes.
pub const SCHEMA_VERSION: u32 = 1;

/// One runnable benchmark: what to spawn and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub name: String,
    pub kind: BenchmarkKind,
    pub executable: String,
    /// Script or program file handed to the executable, checked before the run.
    #[serde(default)]
    pub entry_point: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Flags for the runtime itself, placed before the entry point.
    #[serde(default)]
    pub runtime_flags: Vec<String>,
}

impl BenchmarkSpec {
    /// Arguments passed to `executable`, in spawn order.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.runtime_flags.clone();
        if let Some(entry) = &self.entry_point {
            argv.push(entry.to_string_lossy().into_owned());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Human-readable command line, for logs only.
    pub fn display_command(&self) -> String {
        std::iter::once(self.executable.clone())
            .chain(self.argv())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_seconds: f64,
    pub raw_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Metrics scraped from one benchmark's output. Missing metrics are absent, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet(BTreeMap<String, f64>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    /// Records `value` unless the metric is already set. Returns whether it was stored.
    pub fn insert_if_absent(&mut self, metric: &str, value: f64) -> bool {
        if self.0.contains_key(metric) {
            return false;
        }
        self.0.insert(metric.to_string(), value);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Everything the aggregator needs about one executed benchmark.
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub spec: BenchmarkSpec,
    pub result: ExecutionResult,
    pub metrics: MetricSet,
}

/// Consolidated outcome of one harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    schema_version: u32,
    timestamp: DateTime<Utc>,
    configuration: BTreeMap<String, serde_json::Value>,
    raw_results: BTreeMap<String, ExecutionResult>,
    parsed_results: BTreeMap<String, MetricSet>,
}

impl Report {
    /// Merges every run into one report. Each run lands in both result maps,
    /// whatever its status.
    pub fn aggregate(
        configuration: BTreeMap<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
        runs: Vec<BenchmarkRun>,
    ) -> Self {
        let mut raw_results = BTreeMap::new();
        let mut parsed_results = BTreeMap::new();

        for run in runs {
            let name = run.spec.name;
            if raw_results.contains_key(&name) {
                tracing::warn!(benchmark = %name, "duplicate benchmark name; keeping first result");
                continue;
            }
            raw_results.insert(name.clone(), run.result);
            parsed_results.insert(name, run.metrics);
        }

        Self {
            schema_version: SCHEMA_VERSION,
            timestamp,
            configuration,
            raw_results,
            parsed_results,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn configuration(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.configuration
    }

    pub fn raw_results(&self) -> &BTreeMap<String, ExecutionResult> {
        &self.raw_results
    }

    pub fn parsed_results(&self) -> &BTreeMap<String, MetricSet> {
        &self.parsed_results
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExecutionResult)> {
        self.raw_results
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(k, v)| (k.as_str(), v))
    }
}
