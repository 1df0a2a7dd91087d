//! Atomic report persistence.

use crate::error::{HarnessError, Result};
use crate::schema::Report;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes `report` as pretty JSON to `path`, replacing any previous file.
///
/// The JSON is written and synced to a temporary file beside `path`, then
/// renamed over it, so readers see either the old file or the complete new
/// one. The temporary is removed on every failure path.
pub fn persist_report(report: &Report, path: &Path) -> Result<()> {
    let fail = |source: io::Error| HarnessError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(report).map_err(|e| fail(io::Error::other(e)))?;
    json.push('\n');

    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(fail)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(json.as_bytes()).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    sync_dir(&dir);
    tracing::info!(path = %path.display(), bytes = json.len(), "report written");
    Ok(())
}

pub fn load_report(path: &Path) -> Result<Report> {
    let fail = |source: io::Error| HarnessError::Load {
        path: path.to_path_buf(),
        source,
    };
    let content = fs::read_to_string(path).map_err(fail)?;
    serde_json::from_str(&content).map_err(|e| fail(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Makes the rename durable. Failure only weakens crash safety, so it is logged.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
    #[cfg(not(unix))]
    let _ = dir;
}
