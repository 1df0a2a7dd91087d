use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod benches;
pub mod cache;
pub mod config;
pub mod error;
pub mod harness;
pub mod parser;
pub mod persist;
pub mod prereq;
pub mod runner;
pub mod schema;

pub use error::HarnessError;

/// Workload family a benchmark belongs to; selects the metric extraction rules.
#[derive(
    Clone, Copy, Debug, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkKind {
    /// Recursive vs iterative Fibonacci (CPU-bound).
    Fibonacci,
    /// Dense matrix multiplication.
    #[value(alias = "matrix_mult")]
    #[serde(alias = "matrix_mult")]
    Matrix,
    /// Large array allocation, summation and reclamation.
    Memory,
    /// Sequential write then read of a scratch file.
    #[value(alias = "file_io")]
    FileIo,
    /// Interactive HTTP server. Never part of an automated run.
    Http,
}

impl BenchmarkKind {
    /// The four workloads an automated run executes, in order.
    pub const AUTOMATED: [BenchmarkKind; 4] = [
        BenchmarkKind::Fibonacci,
        BenchmarkKind::Matrix,
        BenchmarkKind::Memory,
        BenchmarkKind::FileIo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::Fibonacci => "fibonacci",
            BenchmarkKind::Matrix => "matrix",
            BenchmarkKind::Memory => "memory",
            BenchmarkKind::FileIo => "file_io",
            BenchmarkKind::Http => "http",
        }
    }

    /// Default report key for the preset-derived benchmark of this kind.
    pub fn default_name(&self) -> &'static str {
        match self {
            BenchmarkKind::Matrix => "matrix_mult",
            other => other.as_str(),
        }
    }

    /// Whether an automated run may schedule this kind.
    pub fn is_automated(&self) -> bool {
        !matches!(self, BenchmarkKind::Http)
    }
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
