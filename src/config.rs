//! Configuration loading from `perf-harness.toml`.
//!
//! The file is discovered by walking up from the current directory; every
//! field has a default so an empty file (or none at all) is a valid setup.

use crate::error::{HarnessError, Result};
use crate::schema::BenchmarkSpec;
use crate::BenchmarkKind;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "perf-harness.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub params: WorkloadParams,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Explicit benchmark list; replaces the preset-derived one when non-empty.
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkSpec>,
}

/// Runtime under test. Each preset knows its executable, script layout and probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimePreset {
    /// `node` running `./nodejs/*_test.js`.
    #[default]
    Node,
    /// `python` running `./python/*_test.py`.
    Python,
    /// `java` launching `./java/*Test.java` in single-source mode.
    Java,
    /// The bundled `perf-payload` binary.
    Native,
}

impl RuntimePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimePreset::Node => "node",
            RuntimePreset::Python => "python",
            RuntimePreset::Java => "java",
            RuntimePreset::Native => "native",
        }
    }

    fn default_executable(&self) -> String {
        match self {
            RuntimePreset::Node => "node".to_string(),
            RuntimePreset::Python => "python".to_string(),
            RuntimePreset::Java => "java".to_string(),
            RuntimePreset::Native => native_payload_path().to_string_lossy().into_owned(),
        }
    }

    fn default_script_dir(&self) -> Option<PathBuf> {
        match self {
            RuntimePreset::Node => Some(PathBuf::from("./nodejs")),
            RuntimePreset::Python => Some(PathBuf::from("./python")),
            RuntimePreset::Java => Some(PathBuf::from("./java")),
            RuntimePreset::Native => None,
        }
    }

    fn default_libraries(&self) -> Vec<String> {
        match self {
            RuntimePreset::Node => vec!["mathjs".to_string()],
            RuntimePreset::Python => vec!["numpy".to_string(), "psutil".to_string()],
            RuntimePreset::Java | RuntimePreset::Native => Vec::new(),
        }
    }

    /// Probe argv with a `{library}` placeholder; exit status 0 means present.
    fn default_library_probe(&self) -> Vec<String> {
        match self {
            RuntimePreset::Node => vec!["-e".into(), "require.resolve('{library}')".into()],
            RuntimePreset::Python => vec!["-c".into(), "import {library}".into()],
            RuntimePreset::Java | RuntimePreset::Native => Vec::new(),
        }
    }

    fn script_file(&self, kind: BenchmarkKind) -> Option<String> {
        if *self == RuntimePreset::Java {
            let class = match kind {
                BenchmarkKind::Fibonacci => "FibonacciTest",
                BenchmarkKind::Matrix => "MatrixMultTest",
                BenchmarkKind::Memory => "MemoryTest",
                BenchmarkKind::FileIo => "FileIOTest",
                BenchmarkKind::Http => "HttpServerTest",
            };
            return Some(format!("{class}.java"));
        }
        let stem = match kind {
            BenchmarkKind::Fibonacci => "fibonacci_test",
            BenchmarkKind::Matrix => "matrix_mult_test",
            BenchmarkKind::Memory => "memory_test",
            BenchmarkKind::FileIo => "file_io_test",
            BenchmarkKind::Http => "http_server_test",
        };
        match self {
            RuntimePreset::Node => Some(format!("{stem}.js")),
            RuntimePreset::Python => Some(format!("{stem}.py")),
            RuntimePreset::Java | RuntimePreset::Native => None,
        }
    }

    fn runtime_flags(&self, kind: BenchmarkKind) -> Vec<String> {
        match (self, kind) {
            (RuntimePreset::Node, BenchmarkKind::Memory) => vec!["--expose-gc".to_string()],
            _ => Vec::new(),
        }
    }
}

/// `perf-payload` next to the running executable.
fn native_payload_path() -> PathBuf {
    let name = format!("perf-payload{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub preset: RuntimePreset,
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
    #[serde(default)]
    pub required_libraries: Option<Vec<String>>,
    #[serde(default)]
    pub library_probe: Option<Vec<String>>,
}

impl RuntimeConfig {
    pub fn executable(&self) -> String {
        self.executable
            .clone()
            .unwrap_or_else(|| self.preset.default_executable())
    }

    pub fn script_dir(&self) -> Option<PathBuf> {
        self.script_dir
            .clone()
            .or_else(|| self.preset.default_script_dir())
    }

    pub fn required_libraries(&self) -> Vec<String> {
        self.required_libraries
            .clone()
            .unwrap_or_else(|| self.preset.default_libraries())
    }

    pub fn library_probe(&self) -> Vec<String> {
        self.library_probe
            .clone()
            .unwrap_or_else(|| self.preset.default_library_probe())
    }
}

/// Size parameters handed to each workload as its first positional argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadParams {
    #[serde(default = "default_fibonacci_n")]
    pub fibonacci_n: u32,
    #[serde(default = "default_matrix_size")]
    pub matrix_size: usize,
    #[serde(default = "default_memory_array_size")]
    pub memory_array_size: usize,
    #[serde(default = "default_file_io_size_mb")]
    pub file_io_size_mb: u64,
    #[serde(default = "default_file_io_chunk_mb")]
    pub file_io_chunk_mb: u64,
}

impl Default for WorkloadParams {
    fn default() -> Self {
        Self {
            fibonacci_n: default_fibonacci_n(),
            matrix_size: default_matrix_size(),
            memory_array_size: default_memory_array_size(),
            file_io_size_mb: default_file_io_size_mb(),
            file_io_chunk_mb: default_file_io_chunk_mb(),
        }
    }
}

fn default_fibonacci_n() -> u32 {
    40
}
fn default_matrix_size() -> usize {
    1000
}
fn default_memory_array_size() -> usize {
    10_000_000
}
fn default_file_io_size_mb() -> u64 {
    1000
}
fn default_file_io_chunk_mb() -> u64 {
    1
}

impl WorkloadParams {
    fn args_for(&self, kind: BenchmarkKind) -> Vec<String> {
        match kind {
            BenchmarkKind::Fibonacci => vec![self.fibonacci_n.to_string()],
            BenchmarkKind::Matrix => vec![self.matrix_size.to_string()],
            BenchmarkKind::Memory => vec![self.memory_array_size.to_string()],
            BenchmarkKind::FileIo => vec![
                self.file_io_size_mb.to_string(),
                self.file_io_chunk_mb.to_string(),
            ],
            BenchmarkKind::Http => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound for a single benchmark (e.g. "600s", "10m").
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> String {
    "600s".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("perf_results.json")
}

impl HarnessConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| HarnessError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Walks up from the current directory looking for [`CONFIG_FILE_NAME`].
    pub fn discover() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.runner.timeout)
    }

    /// Benchmarks for an automated run, in execution order.
    pub fn benchmark_specs(&self) -> Result<Vec<BenchmarkSpec>> {
        let specs = if self.benchmarks.is_empty() {
            BenchmarkKind::AUTOMATED
                .iter()
                .map(|kind| self.preset_spec(*kind))
                .collect()
        } else {
            self.benchmarks.clone()
        };

        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(HarnessError::InvalidConfig(format!(
                    "duplicate benchmark name '{}'",
                    spec.name
                )));
            }
            if !spec.kind.is_automated() {
                return Err(HarnessError::InvalidConfig(format!(
                    "benchmark '{}' has kind '{}', which is interactive only",
                    spec.name, spec.kind
                )));
            }
        }
        Ok(specs)
    }

    fn preset_spec(&self, kind: BenchmarkKind) -> BenchmarkSpec {
        let preset = self.runtime.preset;
        let mut args = self.params.args_for(kind);

        let entry_point = match (self.runtime.script_dir(), preset.script_file(kind)) {
            (Some(dir), Some(file)) => Some(dir.join(file)),
            _ => None,
        };
        if preset == RuntimePreset::Native {
            args.insert(0, native_subcommand(kind).to_string());
        }

        BenchmarkSpec {
            name: kind.default_name().to_string(),
            kind,
            executable: self.runtime.executable(),
            entry_point,
            args,
            runtime_flags: preset.runtime_flags(kind),
        }
    }

    /// Name/value pairs recorded in the report.
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("runtime".to_string(), json!(self.runtime.preset.as_str()));
        snapshot.insert("executable".to_string(), json!(self.runtime.executable()));
        snapshot.insert("fibonacci_n".to_string(), json!(self.params.fibonacci_n));
        snapshot.insert("matrix_size".to_string(), json!(self.params.matrix_size));
        snapshot.insert(
            "memory_array_size".to_string(),
            json!(self.params.memory_array_size),
        );
        snapshot.insert(
            "file_io_size_mb".to_string(),
            json!(self.params.file_io_size_mb),
        );
        snapshot.insert(
            "file_io_chunk_mb".to_string(),
            json!(self.params.file_io_chunk_mb),
        );
        snapshot.insert("timeout".to_string(), json!(self.runner.timeout));
        snapshot.insert(
            "parser_contract_version".to_string(),
            json!(crate::parser::CONTRACT_VERSION),
        );
        snapshot.insert(
            "output_file".to_string(),
            json!(self.output.path.to_string_lossy()),
        );
        snapshot
    }

    /// Commented default configuration.
    pub fn default_toml() -> String {
        r#"# perf-harness configuration

[runtime]
# Runtime under test: "node", "python", "java" or "native" (bundled perf-payload)
preset = "node"
# executable = "node"
# script_dir = "./nodejs"
# required_libraries = ["mathjs"]
# library_probe = ["-e", "require.resolve('{library}')"]

[params]
fibonacci_n = 40
matrix_size = 1000
memory_array_size = 10000000
file_io_size_mb = 1000
file_io_chunk_mb = 1

[runner]
# Per-benchmark bound; a child still running after it is killed
timeout = "600s"

[output]
path = "perf_results.json"

# Replace the preset-derived benchmarks with an explicit list:
# [[benchmarks]]
# name = "fibonacci"
# kind = "fibonacci"
# executable = "node"
# entry_point = "./nodejs/fibonacci_test.js"
# args = ["40"]
"#
        .to_string()
    }
}

/// Subcommand of `perf-payload` implementing `kind`.
pub fn native_subcommand(kind: BenchmarkKind) -> &'static str {
    match kind {
        BenchmarkKind::Fibonacci => "fibonacci",
        BenchmarkKind::Matrix => "matrix",
        BenchmarkKind::Memory => "memory",
        BenchmarkKind::FileIo => "file-io",
        BenchmarkKind::Http => "http",
    }
}

/// Parses "500ms", "30s", "1.5s", "10m"; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(HarnessError::InvalidConfig("empty duration".to_string()));
    }

    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .trim()
        .parse()
        .map_err(|_| HarnessError::InvalidConfig(format!("invalid duration number: {num_part}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(HarnessError::InvalidConfig(format!(
            "duration must be non-negative: {s}"
        )));
    }

    let secs = match unit_part.to_lowercase().as_str() {
        "ms" => value / 1_000.0,
        "s" | "" => value,
        "m" | "min" => value * 60.0,
        "h" => value * 3_600.0,
        other => {
            return Err(HarnessError::InvalidConfig(format!(
                "unknown duration unit: {other}"
            )))
        }
    };
    Duration::try_from_secs_f64(secs)
        .map_err(|e| HarnessError::InvalidConfig(format!("duration out of range: {s}: {e}")))
}
