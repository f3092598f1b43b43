use anyhow::Result;
use serde_json::{json, Value};

use super::common::*;

pub async fn tool_host_status(_args: Value, ctx: ToolContext) -> Result<Value> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
        "cwd": ctx.current_dir().to_string_lossy(),
        "download_dir": ctx.download_dir.to_string_lossy(),
        "sessions": {
            "total": ctx.sessions.len(),
            "running": ctx.sessions.running_count(),
        },
        "metrics": ctx.metrics.snapshot(),
    }))
}
