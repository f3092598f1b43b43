//! Platform shell indirection and process-group signalling.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Signal delivered to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Polite termination (SIGTERM).
    Terminate,
    /// Forced termination (SIGKILL).
    Kill,
}

/// Build a command that runs `command_line` through the platform shell in
/// `cwd`, as the leader of a fresh process group, with piped output.
pub fn shell_command(command_line: &str, cwd: &Path) -> Command {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        // pgid == pid, so the whole tree can be signalled with killpg
        cmd.process_group(0);
        cmd
    };

    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    };

    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Signal every process in the group led by `pid`.
///
/// Best-effort: a group that already exited is not an error.
#[cfg(unix)]
pub async fn signal_process_group(pid: u32, signal: GroupSignal) {
    let sig = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };

    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, sig) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!("killpg({}, {:?}) failed: {}", pid, signal, err);
        }
    }
}

#[cfg(windows)]
pub async fn signal_process_group(pid: u32, _signal: GroupSignal) {
    // No signals on Windows: taskkill /T walks the child tree.
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::warn!("taskkill for pid {} failed: {}", pid, e);
    }
}
