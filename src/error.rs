//! Unified error type for toolhost: maps internal errors to JSON-RPC codes.

use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
/// Application-level server error (implementation-defined).
const SERVER_ERROR: i32 = -32000;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(u64),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `stdout`/`stderr` hold what was captured right before the kill signal.
    #[error("Command timed out after {timeout_ms} ms")]
    Timeout {
        timeout_ms: u64,
        stdout: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl HostError {
    /// JSON-RPC error code for this error variant.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::ParseError(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::ToolNotFound(_)
            | Self::SessionNotFound(_)
            | Self::Spawn { .. }
            | Self::Timeout { .. }
            | Self::Io(_) => SERVER_ERROR,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Convert to (code, message) pair for RpcResponse::error.
    pub fn into_rpc(self) -> (i32, String) {
        let code = self.rpc_code();
        (code, self.to_string())
    }
}

/// Render a handler error for an `isError` tool result.
///
/// Timeouts carry the output captured before the process group was killed;
/// it is always appended so the caller sees how far the command got.
pub fn describe_tool_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HostError>() {
        Some(HostError::Timeout { stdout, stderr, .. }) => {
            let mut text = format!("Error: {}", err);
            if !stdout.is_empty() {
                text.push_str("\n--- stdout before kill ---\n");
                text.push_str(stdout);
            }
            if !stderr.is_empty() {
                text.push_str("\n--- stderr before kill ---\n");
                text.push_str(stderr);
            }
            text
        }
        _ => format!("Error: {:#}", err),
    }
}
