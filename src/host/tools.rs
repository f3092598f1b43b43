//! Built-in tool catalog.

use anyhow::Result;
use serde_json::json;

use super::aliases;
use super::handlers::*;
use super::registry::{ToolDescriptor, ToolRegistry};

/// Every built-in tool with its input schema.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "run_command",
            "Run a shell command and wait for it to finish. Returns exit code, stdout and stderr (each capped). The process group is killed if it outlives the timeout.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command line, run through the platform shell" },
                    "cwd": { "type": "string", "description": "Working directory (default: host working directory)" },
                    "timeout_ms": { "type": "integer", "description": "Timeout in milliseconds (default: 60000, max: 600000)" }
                },
                "required": ["command"]
            }),
            process::tool_run_command,
        ),
        ToolDescriptor::new(
            "start_process",
            "Start a long-running command in the background. Returns a session id to poll with read_process.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command line, run through the platform shell" },
                    "cwd": { "type": "string", "description": "Working directory (default: host working directory)" }
                },
                "required": ["command"]
            }),
            process::tool_start_process,
        ),
        ToolDescriptor::new(
            "read_process",
            "Status and most recent output (stdout and stderr combined) of a background session.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "integer", "description": "Id returned by start_process" }
                },
                "required": ["session_id"]
            }),
            process::tool_read_process,
        ),
        ToolDescriptor::new(
            "kill_process",
            "Terminate a background session and forget it.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "integer", "description": "Id returned by start_process" }
                },
                "required": ["session_id"]
            }),
            process::tool_kill_process,
        ),
        ToolDescriptor::new(
            "list_processes",
            "List background sessions with their status.",
            json!({ "type": "object", "properties": {} }),
            process::tool_list_processes,
        ),
        ToolDescriptor::new(
            "read_file",
            "Read a text file. Relative paths resolve against the host working directory.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "max_bytes": { "type": "integer", "description": "Read at most this many bytes (default: 1 MiB)" }
                },
                "required": ["path"]
            }),
            files::tool_read_file,
        ),
        ToolDescriptor::new(
            "write_file",
            "Write (or append) text to a file, creating parent directories.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "content": { "type": "string", "description": "Text to write" },
                    "append": { "type": "boolean", "description": "Append instead of overwrite", "default": false }
                },
                "required": ["path", "content"]
            }),
            files::tool_write_file,
        ),
        ToolDescriptor::new(
            "list_directory",
            "List directory entries with type and size.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory (default: host working directory)" }
                }
            }),
            files::tool_list_directory,
        ),
        ToolDescriptor::new(
            "get_working_directory",
            "Current host working directory.",
            json!({ "type": "object", "properties": {} }),
            files::tool_get_working_directory,
        ),
        ToolDescriptor::new(
            "set_working_directory",
            "Change the host working directory used for relative paths and commands.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Existing directory" }
                },
                "required": ["path"]
            }),
            files::tool_set_working_directory,
        ),
        ToolDescriptor::new(
            "git_status",
            "Branch and changed files of the repository in the working directory.",
            json!({ "type": "object", "properties": {} }),
            git::tool_git_status,
        ),
        ToolDescriptor::new(
            "git_diff",
            "Unified diff of working tree (or staged) changes.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Limit the diff to this path" },
                    "staged": { "type": "boolean", "description": "Diff the index instead of the working tree", "default": false }
                }
            }),
            git::tool_git_diff,
        ),
        ToolDescriptor::new(
            "git_log",
            "Recent commits: hash, author, date, subject.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Number of commits (default: 10, max: 100)", "default": 10 }
                }
            }),
            git::tool_git_log,
        ),
        ToolDescriptor::new(
            "download_file",
            "Download an http(s) URL into the download directory.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "http or https URL" },
                    "filename": { "type": "string", "description": "Target file name (default: last URL path segment)" }
                },
                "required": ["url"]
            }),
            download::tool_download_file,
        ),
        ToolDescriptor::new(
            "host_status",
            "Host uptime, call counters and session counts.",
            json!({ "type": "object", "properties": {} }),
            meta::tool_host_status,
        ),
    ]
}

/// Registry of the built-in tools. Fails if an alias points at a tool that
/// does not exist.
pub fn builtin_registry() -> Result<ToolRegistry> {
    let registry = ToolRegistry::new(builtin_tools())?;
    for (alias, canonical) in aliases::tool_aliases() {
        if registry.get(canonical).is_none() {
            anyhow::bail!("alias {} points at unknown tool {}", alias, canonical);
        }
    }
    tracing::debug!("Registered {} built-in tools", registry.len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::dispatcher::Dispatcher;
    use crate::host::state::test_context;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn test_builtin_registry_is_consistent() {
        let registry = builtin_registry().unwrap();
        for def in registry.definitions() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[test]
    fn test_every_alias_resolves_to_a_registered_tool() {
        let registry = builtin_registry().unwrap();

        for (alias, canonical) in aliases::tool_aliases() {
            let variants = [
                alias.to_string(),
                alias.to_ascii_uppercase(),
                alias.replace('_', "-"),
                format!("  {alias} "),
            ];
            for variant in variants {
                let (name, args) = aliases::normalize(&variant, json!({}));
                assert_eq!(name, canonical, "{variant:?}");
                assert!(args.is_object());
                let tool = registry.get(&name).unwrap();
                assert_eq!(tool.definition.name, canonical);
                assert_eq!(tool.name(), canonical);
            }
        }

        for def in registry.definitions() {
            assert_eq!(aliases::normalize(&def.name, json!({})).0, def.name);
        }
    }

    #[tokio::test]
    async fn test_every_alias_reaches_its_canonical_tool() {
        let temp = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(builtin_registry().unwrap(), test_context(temp.path()));

        // Tools whose output is deterministic for an empty argument set.
        for (alias, canonical) in aliases::tool_aliases() {
            if !matches!(
                canonical,
                "get_working_directory" | "list_directory" | "list_processes" | "read_file"
            ) {
                continue;
            }
            let via_alias = dispatcher.call(alias, Value::Null).await;
            let via_canonical = dispatcher.call(canonical, Value::Null).await;
            assert_eq!(via_alias, via_canonical, "{alias} -> {canonical}");
        }
    }
}
