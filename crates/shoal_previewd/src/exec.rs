//! Bounded external-process execution.
//!
//! Every external tool invocation in the server goes through [`run_tool`]:
//! the binary is located up front, output pipes are drained on their own
//! threads so a chatty tool cannot deadlock against a full pipe buffer, and
//! exit is polled against a deadline. On expiry the process is killed and
//! reaped, so a wedged tool never leaves an orphan behind.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How often we re-check a running child against its deadline.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cap on stderr carried into error messages.
const STDERR_TRUNCATE: usize = 500;

/// External tool failure. Generators use the variants to decide between
/// trying the next tool in a chain and reporting a final placeholder/error.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary is not installed or not on PATH.
    #[error("{tool} is not installed")]
    Missing { tool: String },

    /// The process exceeded its time budget and was killed.
    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    /// The process exited non-zero.
    #[error("{tool} failed (exit {code:?}): {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Spawning or waiting failed at the OS level.
    #[error("failed to run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a tool to completion under `timeout`, returning its stdout bytes.
pub fn run_tool<S: AsRef<OsStr>>(
    tool: &str,
    args: &[S],
    timeout: Duration,
) -> Result<Vec<u8>, ToolError> {
    let program = which::which(tool).map_err(|_| ToolError::Missing {
        tool: tool.to_string(),
    })?;
    debug!(
        "Running {} {:?} (budget {}s)",
        tool,
        args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>(),
        timeout.as_secs()
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::Io {
            tool: tool.to_string(),
            source: e,
        })?;

    let stdout_thread = spawn_drain(child.stdout.take());
    let stderr_thread = spawn_drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_and_reap(&mut child);
            let _ = stdout_thread.join();
            let _ = stderr_thread.join();
            warn!("{} exceeded its {}s budget, killed", tool, timeout.as_secs());
            return Err(ToolError::TimedOut {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
        Err(e) => {
            kill_and_reap(&mut child);
            let _ = stdout_thread.join();
            let _ = stderr_thread.join();
            return Err(ToolError::Io {
                tool: tool.to_string(),
                source: e,
            });
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    if !status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            code: status.code(),
            stderr: truncate_stderr(&String::from_utf8_lossy(&stderr)),
        });
    }
    Ok(stdout)
}

/// Poll for exit until the deadline. `Ok(None)` means the budget ran out.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_drain<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut collected = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut collected);
        }
        collected
    })
}

fn truncate_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.len() > STDERR_TRUNCATE {
        let cut = stderr
            .char_indices()
            .take_while(|(i, _)| *i < STDERR_TRUNCATE)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}... (truncated)", &stderr[..cut])
    } else {
        stderr.to_string()
    }
}
