use anyhow::Result;
use serde_json::{json, Value};

use super::common::*;

pub async fn tool_run_command(args: Value, ctx: ToolContext) -> Result<Value> {
    let command = required_str(&args, "command")?;
    let cwd = command_dir(&args, &ctx);
    let timeout = ctx.command_timeout(optional_u64(&args, "timeout_ms"));

    tracing::debug!("run_command in {}: {}", cwd.display(), command);
    let result = ctx.runner.run(command, &cwd, timeout).await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn tool_start_process(args: Value, ctx: ToolContext) -> Result<Value> {
    let command = required_str(&args, "command")?;
    let cwd = command_dir(&args, &ctx);

    let started = ctx.sessions.start(command, &cwd)?;
    tracing::info!(
        "Started session {} (pid {:?}): {}",
        started.session_id,
        started.pid,
        command
    );
    Ok(serde_json::to_value(started)?)
}

pub async fn tool_read_process(args: Value, ctx: ToolContext) -> Result<Value> {
    let id = session_id(&args)?;
    Ok(serde_json::to_value(ctx.sessions.read(id)?)?)
}

pub async fn tool_kill_process(args: Value, ctx: ToolContext) -> Result<Value> {
    let id = session_id(&args)?;
    let killed = ctx.sessions.kill(id).await?;
    tracing::info!("Killed session {} (was running: {})", id, killed.was_running);
    Ok(serde_json::to_value(killed)?)
}

pub async fn tool_list_processes(_args: Value, ctx: ToolContext) -> Result<Value> {
    let sessions = ctx.sessions.list();
    Ok(json!({
        "total": sessions.len(),
        "running": ctx.sessions.running_count(),
        "sessions": sessions,
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::state::test_context;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_command_uses_host_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        let ctx = test_context(temp.path());

        let out = tool_run_command(json!({"command": "pwd", "cwd": "sub"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(out["exit_code"], 0);
        assert!(out["stdout"].as_str().unwrap().trim_end().ends_with("sub"));
    }

    #[tokio::test]
    async fn test_run_command_timeout_carries_partial_output() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(temp.path());

        let err = tool_run_command(
            json!({"command": "echo started; sleep 5", "timeout_ms": 300}),
            ctx,
        )
        .await
        .unwrap_err();

        match err.downcast_ref::<HostError>() {
            Some(HostError::Timeout { stdout, .. }) => assert!(stdout.contains("started")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle_through_tools() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(temp.path());

        let started = tool_start_process(json!({"command": "echo hi; sleep 30"}), ctx.clone())
            .await
            .unwrap();
        let id = started["session_id"].as_u64().unwrap();

        let mut output = String::new();
        for _ in 0..50 {
            let read = tool_read_process(json!({"session_id": id}), ctx.clone())
                .await
                .unwrap();
            output = read["output"].as_str().unwrap().to_string();
            if output.contains("hi") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(output.contains("hi"));

        let listed = tool_list_processes(json!({}), ctx.clone()).await.unwrap();
        assert_eq!(listed["total"], 1);

        let killed = tool_kill_process(json!({"session_id": id}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(killed["was_running"], true);

        assert!(tool_read_process(json!({"session_id": id}), ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid_params() {
        let temp = TempDir::new().unwrap();
        let ctx = test_context(temp.path());
        let err = tool_start_process(json!({}), ctx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::InvalidParams(_))
        ));
    }
}
