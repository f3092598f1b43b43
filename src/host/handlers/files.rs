use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::common::*;
use crate::error::HostError;

pub async fn tool_read_file(args: Value, ctx: ToolContext) -> Result<Value> {
    let file = required_str(&args, "path")?;
    let max_bytes = optional_u64(&args, "max_bytes")
        .map(|n| n as usize)
        .unwrap_or(ctx.config.exec.max_output_bytes);

    let root = ctx.current_dir();
    let file_path = resolve_path_buf(&root, file);
    if !file_path.is_file() {
        return Err(HostError::InvalidParams(format!("File not found: {}", file)).into());
    }

    let size = tokio::fs::metadata(&file_path).await?.len();
    let mut buf = Vec::with_capacity((size as usize).min(max_bytes));
    tokio::fs::File::open(&file_path)
        .await?
        .take(max_bytes as u64)
        .read_to_end(&mut buf)
        .await?;

    Ok(json!({
        "path": make_relative_pathbuf(&root, &file_path),
        "size": size,
        "truncated": size > buf.len() as u64,
        "content": String::from_utf8_lossy(&buf),
    }))
}

pub async fn tool_write_file(args: Value, ctx: ToolContext) -> Result<Value> {
    let file = required_str(&args, "path")?;
    let content = args
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HostError::InvalidParams("content is required".into()))?;
    let append = optional_bool(&args, "append").unwrap_or(false);

    let root = ctx.current_dir();
    let file_path = resolve_path_buf(&root, file);
    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut handle = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&file_path)
        .await?;
    handle.write_all(content.as_bytes()).await?;
    handle.flush().await?;

    Ok(json!({
        "path": make_relative_pathbuf(&root, &file_path),
        "bytes_written": content.len(),
        "appended": append,
    }))
}

pub async fn tool_list_directory(args: Value, ctx: ToolContext) -> Result<Value> {
    let root = ctx.current_dir();
    let dir = match optional_str(&args, "path") {
        Some(p) => resolve_path_buf(&root, p),
        None => root.clone(),
    };
    if !dir.is_dir() {
        return Err(HostError::InvalidParams(format!("Not a directory: {}", dir.display())).into());
    }

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let file_type = entry.file_type().await?;
        let kind = if file_type.is_dir() {
            "dir"
        } else if file_type.is_symlink() {
            "symlink"
        } else {
            "file"
        };
        let size = if file_type.is_file() {
            entry.metadata().await.map(|m| m.len()).ok()
        } else {
            None
        };
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "type": kind,
            "size": size,
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Ok(json!({
        "path": dir.to_string_lossy(),
        "total": entries.len(),
        "entries": entries,
    }))
}

pub async fn tool_get_working_directory(_args: Value, ctx: ToolContext) -> Result<Value> {
    Ok(json!({ "cwd": ctx.current_dir().to_string_lossy() }))
}

pub async fn tool_set_working_directory(args: Value, ctx: ToolContext) -> Result<Value> {
    let target = required_str(&args, "path")?;
    let dir = resolve_path_buf(&ctx.current_dir(), target);
    if !dir.is_dir() {
        return Err(HostError::InvalidParams(format!("Not a directory: {}", target)).into());
    }

    let dir = tokio::fs::canonicalize(&dir).await?;
    tracing::info!("Working directory set to {}", dir.display());
    ctx.set_current_dir(dir.clone());
    Ok(json!({ "cwd": dir.to_string_lossy() }))
}
