//! Background process sessions.
//!
//! Each session is a detached shell command in its own process group whose
//! combined stdout+stderr lands in a [`TailBuffer`]. A supervisor task owns
//! the child handle; it is the only place that observes exit.
//!
//! Lifecycle: `Running -> Exited` (supervisor, after output is drained) or
//! `Running -> Removed` (explicit kill). Both are terminal and go through
//! [`SessionShared::transition`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::buffer::TailBuffer;
use super::shell::{shell_command, signal_process_group, GroupSignal};
use crate::error::HostError;

const DRAIN_GRACE: Duration = Duration::from_millis(500);
/// Time a session gets to exit after SIGTERM before its group is SIGKILLed.
const KILL_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    /// `exit_code` is `None` when the process died from a signal.
    Exited { exit_code: Option<i32> },
    Removed,
}

struct SessionRecord {
    status: SessionStatus,
    output: TailBuffer,
    ended_at: Option<DateTime<Utc>>,
}

/// State shared between the session table, the output readers and the
/// supervisor task.
pub struct SessionShared {
    pub id: u64,
    pub command: String,
    pub cwd: PathBuf,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    record: Mutex<SessionRecord>,
    /// Cancelled by the supervisor once the child has been waited on.
    reaped: CancellationToken,
}

impl SessionShared {
    fn record(&self) -> MutexGuard<'_, SessionRecord> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append_output(&self, chunk: &[u8]) {
        self.record().output.push(chunk);
    }

    /// Move out of `Running`. Returns false (and changes nothing) if the
    /// session already reached a terminal state.
    fn transition(&self, next: SessionStatus) -> bool {
        let mut record = self.record();
        if record.status != SessionStatus::Running || next == SessionStatus::Running {
            return false;
        }
        record.status = next;
        record.ended_at = Some(Utc::now());
        true
    }

    pub fn status(&self) -> SessionStatus {
        self.record().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let record = self.record();
        SessionSnapshot {
            session_id: self.id,
            command: self.command.clone(),
            cwd: self.cwd.to_string_lossy().to_string(),
            pid: self.pid,
            status: record.status,
            started_at: self.started_at,
            ended_at: record.ended_at,
            output: record.output.snapshot(),
            output_bytes_total: record.output.total_bytes(),
            output_bytes_dropped: record.output.dropped_bytes(),
        }
    }

    fn summary(&self) -> SessionSummary {
        let record = self.record();
        SessionSummary {
            session_id: self.id,
            command: self.command.clone(),
            pid: self.pid,
            status: record.status,
            started_at: self.started_at,
            ended_at: record.ended_at,
        }
    }
}

/// Full view of a session, including the buffered output window.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: u64,
    pub command: String,
    pub cwd: String,
    pub pid: Option<u32>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: String,
    pub output_bytes_total: u64,
    pub output_bytes_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: u64,
    pub command: String,
    pub pid: Option<u32>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: u64,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KilledSession {
    pub session_id: u64,
    /// False when the process had already exited before the kill.
    pub was_running: bool,
}

/// Table of background sessions for one host instance.
pub struct SessionManager {
    next_id: AtomicU64,
    sessions: Mutex<BTreeMap<u64, Arc<SessionShared>>>,
    buffer_bytes: usize,
}

impl SessionManager {
    pub fn new(buffer_bytes: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(BTreeMap::new()),
            buffer_bytes,
        }
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<SessionShared>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn `command` in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, command: &str, cwd: &Path) -> Result<StartedSession, HostError> {
        // Ids are consumed even if the spawn fails, so they can never repeat.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut child = shell_command(command, cwd)
            .spawn()
            .map_err(|source| HostError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let pid = child.id();

        let shared = Arc::new(SessionShared {
            id,
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            pid,
            started_at: Utc::now(),
            record: Mutex::new(SessionRecord {
                status: SessionStatus::Running,
                output: TailBuffer::new(self.buffer_bytes),
                ended_at: None,
            }),
            reaped: CancellationToken::new(),
        });

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_session_reader(out, shared.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_session_reader(err, shared.clone()));
        }

        self.table().insert(id, shared.clone());
        tokio::spawn(supervise(child, readers, shared));

        tracing::info!("Session {} started (pid {:?}): {}", id, pid, command);
        Ok(StartedSession { session_id: id, pid })
    }

    pub fn read(&self, id: u64) -> Result<SessionSnapshot, HostError> {
        let session = self
            .table()
            .get(&id)
            .cloned()
            .ok_or(HostError::SessionNotFound(id))?;
        Ok(session.snapshot())
    }

    /// Remove the session and terminate its process group if still running.
    /// A group that outlives SIGTERM by [`KILL_GRACE`] gets SIGKILL.
    pub async fn kill(&self, id: u64) -> Result<KilledSession, HostError> {
        let session = self
            .table()
            .remove(&id)
            .ok_or(HostError::SessionNotFound(id))?;

        let was_running = session.transition(SessionStatus::Removed);
        if was_running {
            if let Some(pid) = session.pid {
                terminate_group(&session, pid).await;
            }
            tracing::info!("Session {} killed", id);
        } else {
            tracing::debug!("Session {} removed after exit", id);
        }

        Ok(KilledSession {
            session_id: id,
            was_running,
        })
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        self.table().values().map(|s| s.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn running_count(&self) -> usize {
        self.table()
            .values()
            .filter(|s| s.status() == SessionStatus::Running)
            .count()
    }

    /// Kill every tracked session concurrently; used on shutdown.
    pub async fn kill_all(&self) {
        let ids: Vec<u64> = self.table().keys().copied().collect();
        futures::future::join_all(ids.into_iter().map(|id| self.kill(id))).await;
    }
}

async fn terminate_group(session: &SessionShared, pid: u32) {
    signal_process_group(pid, GroupSignal::Terminate).await;
    if tokio::time::timeout(KILL_GRACE, session.reaped.cancelled())
        .await
        .is_ok()
    {
        return;
    }

    tracing::warn!("Session {} ignored SIGTERM, sending SIGKILL", session.id);
    signal_process_group(pid, GroupSignal::Kill).await;
    if tokio::time::timeout(KILL_GRACE, session.reaped.cancelled())
        .await
        .is_err()
    {
        tracing::error!("Session {} (pid {}) still running after SIGKILL", session.id, pid);
    }
}

fn spawn_session_reader<R>(mut reader: R, shared: Arc<SessionShared>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => shared.append_output(&chunk[..n]),
                Err(e) => {
                    tracing::debug!("session {} reader stopped: {}", shared.id, e);
                    break;
                }
            }
        }
    })
}

async fn supervise(mut child: Child, readers: Vec<JoinHandle<()>>, shared: Arc<SessionShared>) {
    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!("session {}: wait failed: {}", shared.id, e);
            None
        }
    };
    shared.reaped.cancel();

    // Output must be fully captured before the session reports Exited.
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    if shared.transition(SessionStatus::Exited { exit_code }) {
        tracing::info!("Session {} exited with {:?}", shared.id, exit_code);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    async fn wait_for_exit(manager: &SessionManager, id: u64) -> SessionSnapshot {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let snap = manager.read(id).unwrap();
            if snap.status != SessionStatus::Running {
                return snap;
            }
            assert!(Instant::now() < deadline, "session {id} never exited");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_session_ids_strictly_increase() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let mut last = 0;
        for _ in 0..4 {
            let started = manager.start("true", temp.path()).unwrap();
            assert!(started.session_id > last);
            last = started.session_id;
        }
        assert_eq!(manager.len(), 4);
    }

    #[tokio::test]
    async fn test_echo_output_is_never_lost() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let started = manager.start("echo hi", temp.path()).unwrap();
        let first = manager.read(started.session_id).unwrap();
        assert!(matches!(
            first.status,
            SessionStatus::Running | SessionStatus::Exited { exit_code: Some(0) }
        ));

        let done = wait_for_exit(&manager, started.session_id).await;
        assert_eq!(done.status, SessionStatus::Exited { exit_code: Some(0) });
        assert!(done.output.contains("hi"));
        assert!(done.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_output_window_keeps_trailing_bytes() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(16);

        let started = manager
            .start("printf '0123456789abcdefghijXYZ'", temp.path())
            .unwrap();
        let done = wait_for_exit(&manager, started.session_id).await;

        assert_eq!(done.output, "789abcdefghijXYZ");
        assert_eq!(done.output_bytes_total, 23);
        assert_eq!(done.output_bytes_dropped, 7);
    }

    #[tokio::test]
    async fn test_stderr_is_combined_into_output() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let started = manager.start("echo problem 1>&2; exit 4", temp.path()).unwrap();
        let done = wait_for_exit(&manager, started.session_id).await;
        assert_eq!(done.status, SessionStatus::Exited { exit_code: Some(4) });
        assert!(done.output.contains("problem"));
    }

    #[tokio::test]
    async fn test_kill_removes_session_and_stops_process() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let started = manager.start("sleep 30", temp.path()).unwrap();
        let pid = started.pid.unwrap() as libc::pid_t;

        let killed = manager.kill(started.session_id).await.unwrap();
        assert!(killed.was_running);
        assert!(matches!(
            manager.read(started.session_id),
            Err(HostError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.kill(started.session_id).await,
            Err(HostError::SessionNotFound(_))
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while unsafe { libc::kill(pid, 0) == 0 } {
            assert!(Instant::now() < deadline, "process {pid} survived kill");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_kill_all_escalates_when_term_is_ignored() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let started = manager
            .start("trap '' TERM; echo ready; while :; do sleep 0.1; done", temp.path())
            .unwrap();
        let pid = started.pid.unwrap() as libc::pid_t;

        let deadline = Instant::now() + Duration::from_secs(5);
        while !manager.read(started.session_id).unwrap().output.contains("ready") {
            assert!(Instant::now() < deadline, "trap was never installed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        manager.kill_all().await;
        assert!(manager.list().is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        while unsafe { libc::kill(pid, 0) == 0 } {
            assert!(Instant::now() < deadline, "process {pid} survived kill_all");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let started = manager.start("true", temp.path()).unwrap();
        wait_for_exit(&manager, started.session_id).await;

        let killed = manager.kill(started.session_id).await.unwrap();
        assert!(!killed.was_running);
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn test_list_and_kill_all() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let a = manager.start("sleep 30", temp.path()).unwrap();
        let b = manager.start("sleep 30", temp.path()).unwrap();

        let listed = manager.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, a.session_id);
        assert_eq!(listed[1].session_id, b.session_id);
        assert!(listed.iter().all(|s| s.status == SessionStatus::Running));

        manager.kill_all().await;
        assert!(manager.list().is_empty());
    }

    #[tokio::test]
    async fn test_start_in_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(1024);

        let err = manager
            .start("echo hi", &temp.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, HostError::Spawn { .. }));
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_terminal_states_are_permanent() {
        let shared = SessionShared {
            id: 1,
            command: "x".into(),
            cwd: PathBuf::from("/"),
            pid: None,
            started_at: Utc::now(),
            record: Mutex::new(SessionRecord {
                status: SessionStatus::Running,
                output: TailBuffer::new(8),
                ended_at: None,
            }),
            reaped: CancellationToken::new(),
        };

        assert!(shared.transition(SessionStatus::Exited { exit_code: Some(0) }));
        assert!(!shared.transition(SessionStatus::Removed));
        assert!(!shared.transition(SessionStatus::Exited { exit_code: Some(1) }));
        assert_eq!(shared.status(), SessionStatus::Exited { exit_code: Some(0) });
    }
}
