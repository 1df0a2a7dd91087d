//! Child-process execution for one benchmark at a time.

use crate::schema::{BenchmarkSpec, ExecutionResult, ExecutionStatus};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Spawns benchmarks as isolated children and records what happened.
///
/// `run` never fails: spawn errors, nonzero exits and timeouts all become an
/// [`ExecutionResult`] with `status = Failure`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

enum Exit {
    Exited(ExitStatus),
    TimedOut(Duration),
    WaitFailed(std::io::Error),
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// How long to keep reading a pipe after the child is gone. A grandchild
    /// that inherited stdout can otherwise keep it open indefinitely.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn run(&self, spec: &BenchmarkSpec) -> ExecutionResult {
        tracing::debug!(benchmark = %spec.name, command = %spec.display_command(), "spawning");
        let result = self.run_command(&spec.executable, &spec.argv());
        match result.status {
            ExecutionStatus::Success => tracing::info!(
                benchmark = %spec.name,
                seconds = result.duration_seconds,
                "benchmark finished"
            ),
            ExecutionStatus::Failure => tracing::warn!(
                benchmark = %spec.name,
                seconds = result.duration_seconds,
                detail = result.error_detail.as_deref().unwrap_or("unknown"),
                "benchmark failed"
            ),
        }
        result
    }

    /// Runs `program args...` with stdin closed and both output streams captured.
    pub fn run_command(&self, program: &str, args: &[String]) -> ExecutionResult {
        let start = Instant::now();
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let detail = format!("failed to spawn {program}: {e}");
                return ExecutionResult {
                    status: ExecutionStatus::Failure,
                    duration_seconds: start.elapsed().as_secs_f64(),
                    raw_output: detail.clone(),
                    error_detail: Some(detail),
                    exit_code: None,
                };
            }
        };

        let stdout = PipeDrain::spawn(child.stdout.take());
        let stderr = PipeDrain::spawn(child.stderr.take());

        let exit = match self.timeout {
            None => match child.wait() {
                Ok(status) => Exit::Exited(status),
                Err(e) => Exit::WaitFailed(e),
            },
            Some(limit) => wait_with_deadline(&mut child, start, limit),
        };
        let duration_seconds = start.elapsed().as_secs_f64();

        let stdout = stdout.finish(self.drain_grace);
        let stderr = stderr.finish(self.drain_grace);

        classify(exit, duration_seconds, stdout, stderr)
    }
}

fn wait_with_deadline(child: &mut std::process::Child, start: Instant, limit: Duration) -> Exit {
    let mut interval = Duration::from_millis(1);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Exit::Exited(status),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Exit::WaitFailed(e);
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= limit {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "failed to kill timed-out child");
            }
            let _ = child.wait();
            return Exit::TimedOut(limit);
        }

        thread::sleep(interval.min(limit - elapsed));
        interval = (interval * 2).min(MAX_POLL_INTERVAL);
    }
}

fn classify(exit: Exit, duration_seconds: f64, stdout: String, stderr: String) -> ExecutionResult {
    let (exit_code, detail) = match exit {
        Exit::Exited(status) if status.success() => {
            return ExecutionResult {
                status: ExecutionStatus::Success,
                duration_seconds,
                raw_output: stdout,
                error_detail: None,
                exit_code: status.code(),
            };
        }
        Exit::Exited(status) => match status.code() {
            Some(code) => (Some(code), format!("exited with status {code}")),
            None => (None, format!("terminated without exit code ({status})")),
        },
        Exit::TimedOut(limit) => (None, format!("timed out after {:.1}s", limit.as_secs_f64())),
        Exit::WaitFailed(e) => (None, format!("failed to wait for benchmark: {e}")),
    };

    let raw_output = if !stderr.trim().is_empty() {
        stderr
    } else if !stdout.trim().is_empty() {
        stdout
    } else {
        detail.clone()
    };

    ExecutionResult {
        status: ExecutionStatus::Failure,
        duration_seconds,
        raw_output,
        error_detail: Some(detail),
        exit_code,
    }
}

/// Background reader accumulating one child pipe.
struct PipeDrain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl PipeDrain {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel::<()>();

        if let Some(mut pipe) = pipe {
            let sink = Arc::clone(&buf);
            thread::spawn(move || {
                // `tx` drops with this thread, which is what `finish` waits for.
                let _tx = tx;
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            });
        }

        Self { buf, done }
    }

    fn finish(self, grace: Duration) -> String {
        if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(grace) {
            tracing::warn!("output pipe still open after child exit; keeping partial capture");
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(|p| p.into_inner()));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_success_captures_stdout() {
        let r = ProcessRunner::default().run_command("sh", &sh("echo hello; echo noise >&2"));
        assert_eq!(r.status, ExecutionStatus::Success);
        assert_eq!(r.raw_output, "hello\n");
        assert_eq!(r.exit_code, Some(0));
        assert!(r.error_detail.is_none());
        assert!(r.duration_seconds >= 0.0);
    }

    #[test]
    fn test_failure_prefers_stderr() {
        let r = ProcessRunner::default().run_command("sh", &sh("echo out; echo broke >&2; exit 3"));
        assert_eq!(r.status, ExecutionStatus::Failure);
        assert_eq!(r.raw_output, "broke\n");
        assert_eq!(r.exit_code, Some(3));
        assert!(r.error_detail.unwrap().contains('3'));
    }

    #[test]
    fn test_failure_falls_back_to_stdout_then_message() {
        let r = ProcessRunner::default().run_command("sh", &sh("echo '写入速度: 81.00 MB/秒'; exit 1"));
        assert_eq!(r.status, ExecutionStatus::Failure);
        assert!(r.raw_output.contains("写入速度"));

        let r = ProcessRunner::default().run_command("sh", &sh("exit 7"));
        assert_eq!(r.status, ExecutionStatus::Failure);
        assert_eq!(Some(r.raw_output.as_str()), r.error_detail.as_deref());
    }

    #[test]
    fn test_missing_executable_is_recorded_failure() {
        let r = ProcessRunner::default().run_command("/definitely/not/here/bench", &[]);
        assert_eq!(r.status, ExecutionStatus::Failure);
        assert!(r.raw_output.contains("failed to spawn"));
        assert!(r.exit_code.is_none());
        assert!(r.duration_seconds >= 0.0);
    }

    #[test]
    fn test_timeout_kills_child() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(200)))
            .with_drain_grace(Duration::from_millis(200));
        let r = runner.run_command("sh", &sh("sleep 10"));
        assert_eq!(r.status, ExecutionStatus::Failure);
        assert!(r.error_detail.unwrap().contains("timed out"));
        assert!(r.duration_seconds < 5.0);
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        let r = ProcessRunner::new(Some(Duration::from_secs(30)))
            .run_command("sh", &sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"));
        assert_eq!(r.status, ExecutionStatus::Success);
        assert_eq!(r.raw_output.lines().count(), 20_000);
    }

    #[test]
    fn test_run_uses_spec_argv() {
        let spec = BenchmarkSpec {
            name: "echo".to_string(),
            kind: crate::BenchmarkKind::Fibonacci,
            executable: "sh".to_string(),
            entry_point: None,
            args: vec!["-c".to_string(), "echo \"$0\"".to_string(), "arg0".to_string()],
            runtime_flags: vec![],
        };
        let r = ProcessRunner::default().run(&spec);
        assert_eq!(r.raw_output.trim(), "arg0");
    }
}
