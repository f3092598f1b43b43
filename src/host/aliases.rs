//! Tool-name and parameter-key normalization.
//!
//! Language-model clients rarely use the exact canonical names; they say
//! `ls`, `readFile` or `cmd`. `normalize` maps those onto the registry's
//! canonical tool name and fills canonical argument keys from prioritized
//! fallbacks. Pure: no I/O, and applying it twice changes nothing.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

/// Informal tool name -> canonical tool name.
static TOOL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("exec", "run_command"),
        ("shell", "run_command"),
        ("bash", "run_command"),
        ("run", "run_command"),
        ("execute_command", "run_command"),
        ("spawn", "start_process"),
        ("background", "start_process"),
        ("run_background", "start_process"),
        ("process_status", "read_process"),
        ("poll_process", "read_process"),
        ("read_output", "read_process"),
        ("stop_process", "kill_process"),
        ("terminate", "kill_process"),
        ("ps", "list_processes"),
        ("processes", "list_processes"),
        ("cat", "read_file"),
        ("open_file", "read_file"),
        ("view_file", "read_file"),
        ("create_file", "write_file"),
        ("save_file", "write_file"),
        ("ls", "list_directory"),
        ("list_dir", "list_directory"),
        ("list_files", "list_directory"),
        ("pwd", "get_working_directory"),
        ("cwd", "get_working_directory"),
        ("cd", "set_working_directory"),
        ("chdir", "set_working_directory"),
        ("status", "git_status"),
        ("diff", "git_diff"),
        ("log", "git_log"),
        ("download", "download_file"),
        ("fetch", "download_file"),
        ("wget", "download_file"),
    ]
    .into_iter()
    .collect()
});

const COMMAND_KEYS: &[&str] = &["cmd", "command_line", "script", "shell_command"];
const CWD_KEYS: &[&str] = &["working_directory", "workdir", "dir", "directory"];
const TIMEOUT_KEYS: &[&str] = &["timeout", "timeoutMs"];
const SESSION_KEYS: &[&str] = &["sessionId", "session", "id"];
const FILE_KEYS: &[&str] = &["file_path", "file", "filename", "filepath"];
const DIR_KEYS: &[&str] = &["dir", "directory", "folder"];

/// (tool, canonical key, fallback keys in priority order)
static PARAM_FALLBACKS: &[(&str, &str, &[&str])] = &[
    ("run_command", "command", COMMAND_KEYS),
    ("run_command", "cwd", CWD_KEYS),
    ("run_command", "timeout_ms", TIMEOUT_KEYS),
    ("start_process", "command", COMMAND_KEYS),
    ("start_process", "cwd", CWD_KEYS),
    ("read_process", "session_id", SESSION_KEYS),
    ("kill_process", "session_id", SESSION_KEYS),
    ("read_file", "path", FILE_KEYS),
    ("read_file", "max_bytes", &["limit", "maxBytes"]),
    ("write_file", "path", FILE_KEYS),
    ("write_file", "content", &["contents", "text", "data", "body"]),
    ("list_directory", "path", DIR_KEYS),
    ("set_working_directory", "path", &["dir", "directory", "cwd"]),
    ("git_diff", "path", &["file", "file_path"]),
    ("git_diff", "staged", &["cached"]),
    ("git_log", "limit", &["count", "n", "max_count"]),
    ("download_file", "url", &["uri", "link", "href"]),
    ("download_file", "filename", &["file_name", "name", "output"]),
];

/// Lowercase snake_case form of a raw tool name: `readFile`, `read-file`
/// and ` Read.File ` all become `read_file`.
pub fn clean_tool_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if matches!(ch, '-' | '.' | ' ') {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Canonical tool name for `name`. Unknown names come back cleaned but
/// otherwise unchanged, so the registry lookup reports them as not found.
pub fn resolve_tool_name(name: &str) -> String {
    let cleaned = clean_tool_name(name);
    match TOOL_ALIASES.get(cleaned.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => cleaned,
    }
}

/// Fill canonical argument keys for `tool` from the first present fallback.
/// Existing keys are never removed or overwritten. Non-object arguments are
/// replaced by an empty object.
pub fn normalize_args(tool: &str, args: Value) -> Value {
    let mut map = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (_, canonical, fallbacks) in PARAM_FALLBACKS.iter().filter(|(t, _, _)| *t == tool) {
        if is_present(map.get(*canonical)) {
            continue;
        }
        if let Some(value) = fallbacks
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()).cloned())
        {
            map.insert((*canonical).to_string(), value);
        }
    }

    Value::Object(map)
}

pub fn normalize(name: &str, args: Value) -> (String, Value) {
    let canonical = resolve_tool_name(name);
    let args = normalize_args(&canonical, args);
    (canonical, args)
}

/// All (alias, canonical) pairs, sorted by alias.
pub fn tool_aliases() -> Vec<(&'static str, &'static str)> {
    let mut pairs: Vec<_> = TOOL_ALIASES.iter().map(|(a, c)| (*a, *c)).collect();
    pairs.sort_unstable();
    pairs
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}
