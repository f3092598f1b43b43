mod config;
mod error;
mod exec;
mod host;
mod ipc;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::HostConfig;
use host::{Dispatcher, HostState};

#[derive(Parser)]
#[command(name = "toolhost")]
#[command(about = "Local tool host for language-model clients (MCP over stdio, or HTTP)", long_about = None)]
#[command(version)]
struct Cli {
    /// Serve the HTTP adapter on this address instead of stdio (e.g. 127.0.0.1:8765)
    #[arg(long)]
    http: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("toolhost-worker")
        .enable_all()
        .build()?;

    rt.block_on(run(cli))
}

/// Structured JSON logging by default, text via TOOLHOST_LOG_TEXT=1.
/// Always stderr: stdout carries protocol frames.
fn init_logging() {
    let text_logging = std::env::var("TOOLHOST_LOG_TEXT")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toolhost=info".into());

    if text_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("toolhost starting (pid {})", std::process::id());

    let config = HostConfig::from_environment()?;
    let state = Arc::new(HostState::new(config)?);
    tracing::info!(
        "Working directory {}, downloads to {}",
        state.current_dir().display(),
        state.download_dir.display()
    );

    let dispatcher = Arc::new(Dispatcher::new(host::tools::builtin_registry()?, state.clone()));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let result = match cli.http {
        Some(addr) => ipc::http::serve_http(&addr, dispatcher, shutdown.clone()).await,
        None => ipc::server::run_stdio(dispatcher, shutdown.clone()).await,
    };

    // Background children must not outlive the host.
    state.sessions.kill_all().await;
    tracing::info!("toolhost stopped");
    result
}

#[cfg(unix)]
fn spawn_signal_handler(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to register signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, initiating graceful shutdown");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for ctrl-c: {}", e);
                    return;
                }
                tracing::info!("Ctrl-C received, initiating graceful shutdown");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
}
