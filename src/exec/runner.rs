//! Synchronous command runner: one child process, one outcome.
//!
//! The child runs through the platform shell in its own process group. Its
//! stdout and stderr are drained continuously into [`CappedBuffer`]s so a
//! chatty process never blocks on a full pipe, and a wall-clock timeout kills
//! the whole group.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::buffer::CappedBuffer;
use super::shell::{shell_command, signal_process_group, GroupSignal};
use crate::error::HostError;

/// How long to wait for pipe readers after the child exits. Grandchildren that
/// inherited the pipes can keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

/// Result of one completed command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    max_output_bytes: usize,
}

impl CommandRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Run `command` in `cwd`, killing it if it outlives `timeout`.
    ///
    /// Returns exactly one of: the completed [`CommandResult`],
    /// [`HostError::Spawn`], or [`HostError::Timeout`] carrying the output
    /// captured before the kill.
    pub async fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandResult, HostError> {
        let start = Instant::now();

        let mut child = shell_command(command, cwd)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HostError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let pid = child.id();
        tracing::debug!("run_command spawned pid {:?}: {}", pid, command);

        let stdout_buf = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));
        let stderr_buf = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_capture(out, stdout_buf.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_capture(err, stderr_buf.clone()));
        }

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                drain(readers).await;

                let stdout = lock(&stdout_buf);
                let stderr = lock(&stderr_buf);
                let result = CommandResult {
                    exit_code: status.code(),
                    stdout: stdout.to_string_lossy(),
                    stderr: stderr.to_string_lossy(),
                    stdout_truncated: stdout.truncated(),
                    stderr_truncated: stderr.truncated(),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                tracing::debug!(
                    "run_command pid {:?} exited with {:?} after {}ms",
                    pid,
                    result.exit_code,
                    result.duration_ms
                );
                Ok(result)
            }
            _ = tokio::time::sleep(timeout) => {
                // Snapshot first: whatever was captured up to now is reported.
                let stdout = lock(&stdout_buf).to_string_lossy();
                let stderr = lock(&stderr_buf).to_string_lossy();

                if let Some(pid) = pid {
                    signal_process_group(pid, GroupSignal::Kill).await;
                }
                if let Err(e) = child.kill().await {
                    tracing::debug!("kill after timeout: {}", e);
                }
                for reader in readers {
                    reader.abort();
                }

                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!("run_command timed out after {}ms: {}", timeout_ms, command);
                Err(HostError::Timeout {
                    timeout_ms,
                    stdout,
                    stderr,
                })
            }
        }
    }
}

fn lock(buf: &Mutex<CappedBuffer>) -> std::sync::MutexGuard<'_, CappedBuffer> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_capture<R>(mut reader: R, buf: Arc<Mutex<CappedBuffer>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => lock(&buf).push(&chunk[..n]),
                Err(e) => {
                    tracing::debug!("output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}
