use std::path::Path;

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{json, Value};

use super::common::*;
use crate::error::HostError;

const FALLBACK_FILENAME: &str = "download";

/// Last path component of `name`; rejects names that would escape the
/// download directory.
fn sanitize_filename(name: &str) -> Option<String> {
    let base = Path::new(name.trim()).file_name()?.to_string_lossy().to_string();
    match base.as_str() {
        "" | "." | ".." => None,
        _ => Some(base),
    }
}

fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .and_then(sanitize_filename)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

pub async fn tool_download_file(args: Value, ctx: ToolContext) -> Result<Value> {
    let raw_url = required_str(&args, "url")?;
    let url = Url::parse(raw_url)
        .map_err(|e| HostError::InvalidParams(format!("Invalid url {}: {}", raw_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HostError::InvalidParams(format!(
            "Unsupported url scheme: {}",
            url.scheme()
        ))
        .into());
    }

    let filename = match optional_str(&args, "filename") {
        Some(name) => sanitize_filename(name)
            .ok_or_else(|| HostError::InvalidParams(format!("Invalid filename: {}", name)))?,
        None => filename_from_url(&url),
    };

    tokio::fs::create_dir_all(&ctx.download_dir).await?;
    let target = ctx.download_dir.join(&filename);

    tracing::info!("Downloading {} -> {}", url, target.display());
    let response = ctx.http.get(url.clone()).send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?;
    tokio::fs::write(&target, &body).await?;

    Ok(json!({
        "url": url.as_str(),
        "path": target.to_string_lossy(),
        "bytes": body.len(),
        "content_type": content_type,
    }))
}
