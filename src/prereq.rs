//! Pre-run validation of entry points, executables and runtime libraries.

use crate::error::{HarnessError, Result};
use crate::runner::ProcessRunner;
use crate::schema::BenchmarkSpec;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers whether a runtime library can be loaded.
pub trait LibraryProbe {
    fn is_available(&self, library: &str) -> bool;
}

impl<F> LibraryProbe for F
where
    F: Fn(&str) -> bool,
{
    fn is_available(&self, library: &str) -> bool {
        self(library)
    }
}

/// Accepts every library; used by runtimes that need none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibraries;

impl LibraryProbe for NoLibraries {
    fn is_available(&self, _library: &str) -> bool {
        true
    }
}

/// Runs `executable args...` with `{library}` substituted; exit 0 means available.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    executable: String,
    args: Vec<String>,
    runner: ProcessRunner,
}

impl CommandProbe {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            runner: ProcessRunner::new(Some(PROBE_TIMEOUT)),
        }
    }
}

impl LibraryProbe for CommandProbe {
    fn is_available(&self, library: &str) -> bool {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{library}", library))
            .collect();
        let result = self.runner.run_command(&self.executable, &args);
        if !result.is_success() {
            tracing::debug!(library, output = %result.raw_output.trim(), "library probe failed");
        }
        result.is_success()
    }
}

/// Collects every missing item before reporting, so one run shows them all.
pub struct PrerequisiteChecker<'a> {
    entry_points: Vec<PathBuf>,
    executables: Vec<String>,
    libraries: Vec<String>,
    probe: &'a dyn LibraryProbe,
}

impl<'a> PrerequisiteChecker<'a> {
    pub fn new(probe: &'a dyn LibraryProbe) -> Self {
        Self {
            entry_points: Vec::new(),
            executables: Vec::new(),
            libraries: Vec::new(),
            probe,
        }
    }

    /// Requires each spec's entry point and executable.
    pub fn for_specs(specs: &[BenchmarkSpec], probe: &'a dyn LibraryProbe) -> Self {
        let mut checker = Self::new(probe);
        for spec in specs {
            if let Some(entry) = &spec.entry_point {
                checker.require_entry_point(entry);
            }
            checker.require_executable(&spec.executable);
        }
        checker
    }

    pub fn require_entry_point(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        if !self.entry_points.contains(&path) {
            self.entry_points.push(path);
        }
        self
    }

    pub fn require_executable(&mut self, executable: &str) -> &mut Self {
        if !self.executables.iter().any(|e| e == executable) {
            self.executables.push(executable.to_string());
        }
        self
    }

    pub fn require_libraries<I, S>(&mut self, libraries: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for library in libraries {
            let library = library.into();
            if !self.libraries.contains(&library) {
                self.libraries.push(library);
            }
        }
        self
    }

    /// Every missing item, in check order.
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();

        for path in &self.entry_points {
            if !path.is_file() {
                missing.push(format!("benchmark entry point not found: {}", path.display()));
            }
        }
        for executable in &self.executables {
            if !executable_exists(executable) {
                missing.push(format!("executable not found: {executable}"));
            }
        }
        for library in &self.libraries {
            if !self.probe.is_available(library) {
                missing.push(format!("required library not available: {library}"));
            }
        }

        missing
    }

    pub fn check(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(HarnessError::Configuration { missing });
        }
        tracing::info!(
            entry_points = self.entry_points.len(),
            executables = self.executables.len(),
            libraries = self.libraries.len(),
            "prerequisites satisfied"
        );
        Ok(())
    }
}

/// A name with a path separator must exist as a file; a bare name must be on `PATH`.
pub fn executable_exists(executable: &str) -> bool {
    let path = Path::new(executable);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file();
    }
    let Some(search) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&search).any(|dir| {
        let candidate = dir.join(executable);
        candidate.is_file()
            || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}
