//! Stdio MCP server: reads framed JSON-RPC requests and routes them to the dispatcher.
//!
//! Each request runs in its own task; replies go through a channel to a
//! single writer task, so frames never interleave and replies may arrive
//! out of order.

use std::sync::Arc;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::framing::{Frame, FrameCodec};
use super::protocol::{RpcRequest, RpcResponse};
use crate::error::HostError;
use crate::host::Dispatcher;

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Replies buffered between request tasks and the writer.
const REPLY_QUEUE: usize = 256;

/// Serve MCP over the process's stdin/stdout until EOF or shutdown.
pub async fn run_stdio(dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Result<()> {
    tracing::info!("MCP server ready on stdio");
    serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        FrameCodec::default(),
        dispatcher,
        shutdown,
    )
    .await
}

/// Serve MCP over an arbitrary byte stream pair, decoding with `codec`.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    codec: FrameCodec,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, codec);
    let (reply_tx, mut reply_rx) = mpsc::channel::<RpcResponse>(REPLY_QUEUE);

    let writer_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, FrameCodec::default());
        while let Some(reply) = reply_rx.recv().await {
            if let Err(e) = sink.send(reply).await {
                tracing::error!("Failed to write reply: {}", e);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Frame::Message(message))) => {
                    let dispatcher = dispatcher.clone();
                    let reply_tx = reply_tx.clone();
                    tokio::spawn(async move {
                        if let Some(reply) = handle_message(message, &dispatcher).await {
                            let _ = reply_tx.send(reply).await;
                        }
                    });
                }
                Some(Ok(Frame::Invalid(reason))) => {
                    tracing::warn!("Malformed request body: {}", reason);
                    let reply = RpcResponse::from_host_error(Value::Null, HostError::ParseError(reason));
                    let _ = reply_tx.send(reply).await;
                }
                Some(Ok(Frame::Oversized(reason))) => {
                    let reply = RpcResponse::from_host_error(Value::Null, HostError::InvalidRequest(reason));
                    let _ = reply_tx.send(reply).await;
                }
                Some(Err(e)) => {
                    tracing::error!("stdin read error: {}", e);
                    break;
                }
                None => {
                    tracing::info!("stdin closed, shutting down");
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, stopping stdio loop");
                break;
            }
        }
    }

    // In-flight requests still hold senders; the writer exits once they finish.
    drop(reply_tx);
    if shutdown.is_cancelled() {
        writer_task.abort();
    } else {
        let _ = writer_task.await;
    }
    shutdown.cancel();
    Ok(())
}

/// Handle one decoded message. `None` for notifications.
pub async fn handle_message(message: Value, dispatcher: &Dispatcher) -> Option<RpcResponse> {
    let id_hint = message.get("id").cloned().unwrap_or(Value::Null);

    let request: RpcRequest = match serde_json::from_value(message) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Invalid request envelope: {}", e);
            return Some(RpcResponse::from_host_error(
                id_hint,
                HostError::InvalidRequest(e.to_string()),
            ));
        }
    };

    if request.is_notification() {
        handle_notification(&request);
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    Some(match route(&request, dispatcher).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(e) => RpcResponse::from_host_error(id, e),
    })
}

fn handle_notification(request: &RpcRequest) {
    match request.method.as_str() {
        "notifications/initialized" | "initialized" => {
            tracing::info!("Client initialized");
        }
        "notifications/cancelled" => {
            tracing::debug!("Client cancelled a request: {}", request.params);
        }
        other => {
            tracing::debug!("Ignoring notification: {}", other);
        }
    }
}

async fn route(request: &RpcRequest, dispatcher: &Dispatcher) -> Result<Value, HostError> {
    match request.method.as_str() {
        "initialize" => Ok(initialize_result(&request.params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": dispatcher.list() })),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HostError::InvalidParams("tools/call requires a tool name".into()))?;
            let args = request
                .params
                .get("arguments")
                .or_else(|| request.params.get("args"))
                .cloned()
                .unwrap_or_else(|| json!({}));

            let outcome = dispatcher.call(name, args).await;
            Ok(outcome.to_mcp_result())
        }
        other => Err(HostError::MethodNotFound(other.to_string())),
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": "toolhost",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
