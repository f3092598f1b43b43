//! Minimal HTTP adapter over the dispatcher.
//! Uses raw `TcpListener`, no external HTTP server dependency.
//!
//! `POST` with `{"name": ..., "args": {...}}` calls a tool and answers
//! `{"result": ...}` or `{"error": "..."}`; `GET` lists the tools. One
//! request per connection.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::framing::{find_header_end, parse_content_length, MAX_BODY_BYTES, MAX_HEADER_BYTES};
use crate::host::Dispatcher;

#[derive(Debug, Deserialize)]
struct CallRequest {
    name: String,
    #[serde(default, alias = "arguments")]
    args: Value,
}

struct HttpRequest {
    method: String,
    body: Vec<u8>,
}

/// Bind `addr` and serve until the cancel token fires.
pub async fn serve_http(
    addr: &str,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, dispatcher, cancel).await
}

pub async fn serve_listener(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("HTTP: listening on http://{}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("HTTP: shutting down");
                break;
            }
            accept = listener.accept() => {
                let (stream, peer) = match accept {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("HTTP: accept failed: {}", e);
                        continue;
                    }
                };

                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &dispatcher).await {
                        tracing::debug!("HTTP: connection from {} failed: {}", peer, e);
                    }
                });
            }
        }
    }
    Ok(())
}

async fn handle_connection(mut stream: TcpStream, dispatcher: &Dispatcher) -> Result<()> {
    let (status, body) = match read_request(&mut stream).await {
        Ok(request) => route(request, dispatcher).await,
        Err(e) => (400, json!({ "error": e.to_string() })),
    };

    let body = serde_json::to_string(&body)?;
    let response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status_line(status),
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            anyhow::bail!("request header too large");
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("connection closed before end of headers");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let header = &buf[..header_end];
    let method = std::str::from_utf8(header)?
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    let length = parse_content_length(header).unwrap_or(0);
    if length > MAX_BODY_BYTES {
        anyhow::bail!("request body too large");
    }

    let body_start = header_end + 4;
    while buf.len() < body_start + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("connection closed before end of body");
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(HttpRequest {
        method,
        body: buf[body_start..body_start + length].to_vec(),
    })
}

async fn route(request: HttpRequest, dispatcher: &Dispatcher) -> (u16, Value) {
    match request.method.as_str() {
        "GET" => (200, json!({ "tools": dispatcher.list() })),
        "POST" => {
            let call: CallRequest = match serde_json::from_slice(&request.body) {
                Ok(c) => c,
                Err(e) => return (400, json!({ "error": format!("Invalid request body: {}", e) })),
            };
            let outcome = dispatcher.call(&call.name, call.args).await;
            (200, outcome.to_http_body())
        }
        other => (405, json!({ "error": format!("Method not allowed: {}", other) })),
    }
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        400 => "400 Bad Request",
        405 => "405 Method Not Allowed",
        _ => "500 Internal Server Error",
    }
}
