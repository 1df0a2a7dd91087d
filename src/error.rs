use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a harness run.
///
/// Anything a misbehaving benchmark does is recorded in the report instead;
/// these variants only cover the harness's own configuration and I/O.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("missing prerequisites:\n{}", format_missing(.missing))]
    Configuration { missing: Vec<String> },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to persist report to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load report from {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_missing(missing: &[String]) -> String {
    missing
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, HarnessError>;
