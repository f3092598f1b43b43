use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;

use crate::error::HostError;

pub use crate::host::state::ToolContext;

/// Resolve a tool-supplied path: absolute paths pass through, relative ones
/// join the host's current working directory.
pub fn resolve_path_buf(root: &Path, file: &str) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(file)
    }
}

/// Strip the root prefix from an absolute path for display.
pub fn make_relative_pathbuf(root: &Path, abs_path: &Path) -> String {
    abs_path
        .strip_prefix(root)
        .ok()
        .and_then(|p| p.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| abs_path.to_string_lossy().to_string())
}

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HostError::InvalidParams(format!("{} is required", key)).into())
}

pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Integers are accepted as JSON numbers or numeric strings; models send both.
pub fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn optional_bool(args: &Value, key: &str) -> Option<bool> {
    match args.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Working directory for a command: the `cwd` argument resolved against the
/// host directory, or the host directory itself.
pub fn command_dir(args: &Value, ctx: &ToolContext) -> PathBuf {
    let base = ctx.current_dir();
    match optional_str(args, "cwd") {
        Some(dir) => resolve_path_buf(&base, dir),
        None => base,
    }
}

pub fn session_id(args: &Value) -> Result<u64> {
    optional_u64(args, "session_id")
        .filter(|id| *id > 0)
        .ok_or_else(|| HostError::InvalidParams("session_id must be a positive integer".into()).into())
}
