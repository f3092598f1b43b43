//! Host state, the explicit context every tool handler receives.
//!
//! One `HostState` per host instance; nothing here is global, so several
//! hosts can live in one process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::HostConfig;
use crate::exec::{CommandRunner, SessionManager};

/// Context handed to tool handlers; cheap to clone across tasks.
pub type ToolContext = Arc<HostState>;

pub struct HostState {
    pub config: HostConfig,
    /// Working directory that relative tool paths resolve against
    cwd: RwLock<PathBuf>,
    /// Target directory for `download_file`
    pub download_dir: PathBuf,
    /// Background process sessions
    pub sessions: SessionManager,
    /// One-shot command execution
    pub runner: CommandRunner,
    /// Runtime metrics (lock-free counters)
    pub metrics: HostMetrics,
    /// Shared HTTP client for network-facing tools
    pub http: reqwest::Client,
    pub started_at: Instant,
}

impl HostState {
    pub fn new(config: HostConfig) -> Result<Self> {
        let http = http_client_builder(&config).build()?;
        Ok(Self::with_http_client(config, http))
    }

    pub fn with_http_client(config: HostConfig, http: reqwest::Client) -> Self {
        Self {
            cwd: RwLock::new(config.workdir()),
            download_dir: config.download_dir(),
            sessions: SessionManager::new(config.exec.session_buffer_bytes),
            runner: CommandRunner::new(config.exec.max_output_bytes),
            metrics: HostMetrics::new(),
            http,
            started_at: Instant::now(),
            config,
        }
    }

    pub fn current_dir(&self) -> PathBuf {
        self.cwd
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_current_dir(&self, dir: PathBuf) {
        *self
            .cwd
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = dir;
    }

    /// Timeout for a synchronous command: the caller's request clamped to
    /// the configured maximum, or the configured default.
    pub fn command_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let exec = &self.config.exec;
        let ms = requested_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(exec.command_timeout_ms)
            .min(exec.max_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Outbound HTTP client settings shared by every network-facing tool.
fn http_client_builder(config: &HostConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(concat!("toolhost/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_millis(config.net.http_timeout_ms))
}

/// Lock-free call counters for the host process.
pub struct HostMetrics {
    /// Total tool calls dispatched
    pub calls_served: AtomicUsize,
    /// Calls that ended with `isError: true`
    pub calls_failed: AtomicUsize,
    /// Cumulative call latency in microseconds (divide by calls_served for avg)
    pub call_latency_us: AtomicUsize,
}

impl HostMetrics {
    pub fn new() -> Self {
        Self {
            calls_served: AtomicUsize::new(0),
            calls_failed: AtomicUsize::new(0),
            call_latency_us: AtomicUsize::new(0),
        }
    }

    pub fn record_call(&self, latency_us: usize, failed: bool) {
        self.calls_served.fetch_add(1, Ordering::Relaxed);
        self.call_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        if failed {
            self.calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let calls = self.calls_served.load(Ordering::Relaxed);
        let latency_total = self.call_latency_us.load(Ordering::Relaxed);
        let avg_latency_us = if calls > 0 { latency_total / calls } else { 0 };

        serde_json::json!({
            "calls_served": calls,
            "calls_failed": self.calls_failed.load(Ordering::Relaxed),
            "avg_call_latency_us": avg_latency_us,
        })
    }
}

/// Fresh host rooted at `workdir`, for tests.
#[cfg(test)]
pub fn test_context(workdir: &std::path::Path) -> ToolContext {
    test_context_with(workdir, |_| {})
}

/// Like [`test_context`], with `adjust` applied to the config first.
#[cfg(test)]
pub fn test_context_with<F>(workdir: &std::path::Path, adjust: F) -> ToolContext
where
    F: FnOnce(&mut HostConfig),
{
    let mut config = HostConfig::default();
    config.paths.workdir = Some(workdir.to_path_buf());
    config.paths.download_dir = Some(workdir.join("downloads"));
    adjust(&mut config);
    let http = http_client_builder(&config)
        .no_proxy()
        .build()
        .expect("http client");
    Arc::new(HostState::with_http_client(config, http))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_timeout_clamping() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(temp.path());

        assert_eq!(ctx.command_timeout(None), Duration::from_millis(60_000));
        assert_eq!(ctx.command_timeout(Some(0)), Duration::from_millis(60_000));
        assert_eq!(ctx.command_timeout(Some(250)), Duration::from_millis(250));
        assert_eq!(
            ctx.command_timeout(Some(10_000_000)),
            Duration::from_millis(600_000)
        );
    }

    #[test]
    fn test_hosts_are_independent() {
        let a_dir = TempDir::new().unwrap();
        let b_dir = TempDir::new().unwrap();
        let a = test_context(a_dir.path());
        let b = test_context(b_dir.path());

        a.set_current_dir(a_dir.path().join("sub"));
        assert_eq!(a.current_dir(), a_dir.path().join("sub"));
        assert_eq!(b.current_dir(), b_dir.path());

        a.metrics.record_call(10, true);
        assert_eq!(a.metrics.snapshot()["calls_failed"], 1);
        assert_eq!(b.metrics.snapshot()["calls_served"], 0);
    }
}
