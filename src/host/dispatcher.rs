//! Tool dispatch: normalize, look up, invoke behind an error boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::aliases;
use super::registry::{ToolDefinition, ToolRegistry};
use super::state::ToolContext;
use crate::error::{describe_tool_error, HostError};

/// Result of one tool call as seen by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Handler payload, or the error message when `is_error` is set.
    /// `Null` means the handler produced nothing.
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            value: Value::String(message),
            is_error: true,
        }
    }

    fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }

    /// MCP `tools/call` result: one text content item, or none for an
    /// empty success.
    pub fn to_mcp_result(&self) -> Value {
        if self.value.is_null() && !self.is_error {
            return json!({ "content": [], "isError": false });
        }
        json!({
            "content": [{ "type": "text", "text": self.text() }],
            "isError": self.is_error,
        })
    }

    /// HTTP adapter body: `{"result": ...}` or `{"error": message}`.
    pub fn to_http_body(&self) -> Value {
        if self.is_error {
            json!({ "error": self.text() })
        } else if self.value.is_null() {
            json!({ "result": {} })
        } else {
            json!({ "result": self.value })
        }
    }
}

pub struct Dispatcher {
    registry: ToolRegistry,
    ctx: ToolContext,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Invoke a tool. Never fails: unknown tools, handler errors and
    /// handler panics all come back as `is_error` outcomes.
    pub async fn call(&self, name: &str, args: Value) -> ToolOutcome {
        let (canonical, args) = aliases::normalize(name, args);

        let Some(tool) = self.registry.get(&canonical) else {
            warn!("Unknown tool requested: {}", name);
            self.ctx.metrics.record_call(0, true);
            return ToolOutcome::error(format!("Error: {}", HostError::ToolNotFound(name.to_string())));
        };

        let handler = tool.handler.clone();
        let ctx = self.ctx.clone();
        let start = Instant::now();

        // The handler is invoked inside the guarded future so a panic while
        // building it is caught too.
        let guarded = AssertUnwindSafe(async move { handler(args, ctx).await }).catch_unwind();

        let outcome = match guarded.await {
            Ok(Ok(value)) => ToolOutcome::success(value),
            Ok(Err(e)) => ToolOutcome::error(describe_tool_error(&e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Tool {} panicked: {}", canonical, message);
                ToolOutcome::error(format!("Error: tool '{}' panicked: {}", canonical, message))
            }
        };

        let latency_us = start.elapsed().as_micros() as usize;
        self.ctx.metrics.record_call(latency_us, outcome.is_error);
        if outcome.is_error {
            warn!(tool = %canonical, latency_us, "Tool call failed");
        } else {
            debug!(tool = %canonical, latency_us, "Tool call completed");
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::registry::ToolDescriptor;
    use crate::host::state::test_context;
    use anyhow::Result;
    use tempfile::TempDir;

    async fn echo(args: Value, _ctx: ToolContext) -> Result<Value> {
        Ok(json!({ "args": args }))
    }

    async fn nothing(_args: Value, _ctx: ToolContext) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn fails(_args: Value, _ctx: ToolContext) -> Result<Value> {
        Err(HostError::InvalidParams("path is required".into()).into())
    }

    async fn panics(args: Value, _ctx: ToolContext) -> Result<Value> {
        if args.is_object() {
            panic!("boom");
        }
        Ok(Value::Null)
    }

    fn dispatcher(temp: &TempDir) -> Dispatcher {
        let registry = ToolRegistry::new(vec![
            ToolDescriptor::new("run_command", "echo", json!({}), echo),
            ToolDescriptor::new("list_processes", "nothing", json!({}), nothing),
            ToolDescriptor::new("read_file", "fails", json!({}), fails),
            ToolDescriptor::new("write_file", "panics", json!({}), panics),
        ])
        .unwrap();
        Dispatcher::new(registry, test_context(temp.path()))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_outcome() {
        let temp = TempDir::new().unwrap();
        let d = dispatcher(&temp);

        let outcome = d.call("nonexistent_tool", json!({})).await;
        assert!(outcome.is_error);
        assert!(outcome.value.as_str().unwrap().contains("nonexistent_tool"));
        assert_eq!(outcome.to_mcp_result()["isError"], true);
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_contained() {
        let temp = TempDir::new().unwrap();
        let d = dispatcher(&temp);

        let failed = d.call("read_file", json!({})).await;
        assert!(failed.is_error);
        assert!(failed.value.as_str().unwrap().contains("path is required"));

        let panicked = d.call("write_file", json!({})).await;
        assert!(panicked.is_error);
        assert!(panicked.value.as_str().unwrap().contains("boom"));

        // The dispatcher keeps working afterwards.
        assert!(!d.call("run_command", json!({})).await.is_error);
        assert_eq!(d.ctx.metrics.snapshot()["calls_failed"], 2);
    }

    #[tokio::test]
    async fn test_null_result_becomes_empty_envelope() {
        let temp = TempDir::new().unwrap();
        let d = dispatcher(&temp);

        let outcome = d.call("list_processes", json!({})).await;
        assert_eq!(outcome.to_mcp_result(), json!({"content": [], "isError": false}));
        assert_eq!(outcome.to_http_body(), json!({"result": {}}));
    }

    #[tokio::test]
    async fn test_alias_dispatches_like_canonical() {
        let temp = TempDir::new().unwrap();
        let d = dispatcher(&temp);

        let via_alias = d.call("bash", json!({"cmd": "ls"})).await;
        let via_canonical = d.call("run_command", json!({"cmd": "ls"})).await;
        assert_eq!(via_alias, via_canonical);
        assert_eq!(via_alias.value["args"]["command"], "ls");
    }

    #[test]
    fn test_outcome_wire_forms() {
        let ok = ToolOutcome::success(json!({"a": 1}));
        assert_eq!(ok.to_http_body(), json!({"result": {"a": 1}}));
        let text = ok.to_mcp_result()["content"][0]["text"].as_str().unwrap().to_string();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"a": 1}));

        let err = ToolOutcome::error("Error: nope".into());
        assert_eq!(err.to_http_body(), json!({"error": "Error: nope"}));
        assert_eq!(err.to_mcp_result()["content"][0]["text"], "Error: nope");
    }
}
