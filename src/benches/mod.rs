//! Native workloads driven by the `perf-payload` binary.
//!
//! Each one prints the labeled lines the output parser understands, so the
//! harness treats them exactly like any other runtime's benchmark scripts.

pub mod fibonacci;

use crate::parser;
use clap::ValueEnum;
use std::hint::black_box;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Which line contract a payload prints.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Labeled text lines only.
    #[default]
    Legacy,
    /// Labeled text lines plus `@metric` lines.
    Structured,
}

/// Line writer shared by all payloads: results to `out`, warnings to `err`.
pub struct Emitter<'a> {
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    format: OutputFormat,
}

impl<'a> Emitter<'a> {
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write, format: OutputFormat) -> Self {
        Self { out, err, format }
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", text.as_ref())?;
        self.out.flush()
    }

    pub fn warn(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.err, "{}", text.as_ref())?;
        self.err.flush()
    }

    /// Emits a `@metric` line when the structured contract is selected.
    pub fn metric(&mut self, name: &str, value: f64, unit: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Legacy => Ok(()),
            OutputFormat::Structured => self.line(parser::structured_line(name, value, unit)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Measured<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Measured<T> {
    pub fn secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Times a single call, keeping the result observable to the optimizer.
pub fn measure<T>(f: impl FnOnce() -> T) -> Measured<T> {
    let start = Instant::now();
    let value = black_box(f());
    let elapsed = start.elapsed();
    Measured { value, elapsed }
}

/// MB/s, or 0 when the phase was too fast to time.
pub fn throughput_mb_s(megabytes: f64, secs: f64) -> f64 {
    if secs <= 0.0 {
        0.0
    } else {
        megabytes / secs
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Emitter, OutputFormat};

    /// Runs `f` against in-memory buffers and returns (stdout, stderr).
    pub fn capture<F>(format: OutputFormat, f: F) -> (String, String)
    where
        F: FnOnce(&mut Emitter<'_>),
    {
        let mut out = Vec::new();
        let mut err = Vec::new();
        {
            let mut emitter = Emitter::new(&mut out, &mut err, format);
            f(&mut emitter);
        }
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }
}
