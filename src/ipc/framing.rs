//! `Content-Length` framing for the stdio transport.
//!
//! A frame is a header block terminated by `\r\n\r\n` that carries a
//! `Content-Length: <n>` field, followed by exactly `n` bytes of UTF-8 JSON.
//! [`FrameCodec`] decodes frames from a byte stream and encodes replies back.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest header block accepted before the terminator is seen.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Largest body a single frame may declare.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A well-formed JSON body.
    Message(Value),
    /// The body was not valid JSON; answered with a null-id parse error.
    Invalid(String),
    /// The header or declared body exceeded the codec limits. The frame is
    /// dropped and answered with a null-id invalid-request error.
    Oversized(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_header_bytes: usize,
    max_body_bytes: usize,
    /// Body bytes of a rejected frame still to be dropped as they arrive.
    discard: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::with_limits(MAX_HEADER_BYTES, MAX_BODY_BYTES)
    }
}

impl FrameCodec {
    pub fn with_limits(max_header_bytes: usize, max_body_bytes: usize) -> Self {
        Self {
            max_header_bytes,
            max_body_bytes,
            discard: 0,
        }
    }
}

/// Position of the first header terminator, if any.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Extract the `Content-Length` value from a header block (case-insensitive
/// field name, surrounding whitespace ignored). A numeric value too large
/// for `usize` saturates to `usize::MAX` so callers reject it by size.
pub fn parse_content_length(header: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    text.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-length") {
            return None;
        }
        let value = value.trim();
        match value.parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                Some(usize::MAX)
            }
            Err(_) => None,
        }
    })
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(src.len());
                src.advance(n);
                self.discard -= n;
                if self.discard > 0 {
                    return Ok(None);
                }
            }

            let Some(header_end) = find_header_end(&src[..]) else {
                if src.len() > self.max_header_bytes {
                    // Keep a possible partial terminator at the tail.
                    let keep = HEADER_TERMINATOR.len() - 1;
                    src.advance(src.len() - keep);
                    tracing::warn!(
                        "Dropping frame header larger than {} bytes",
                        self.max_header_bytes
                    );
                    return Ok(Some(Frame::Oversized(format!(
                        "frame header exceeds {} bytes",
                        self.max_header_bytes
                    ))));
                }
                return Ok(None);
            };
            let body_start = header_end + HEADER_TERMINATOR.len();

            if header_end > self.max_header_bytes {
                src.advance(body_start);
                tracing::warn!("Dropping frame header of {} bytes", header_end);
                return Ok(Some(Frame::Oversized(format!(
                    "frame header exceeds {} bytes",
                    self.max_header_bytes
                ))));
            }

            let Some(length) = parse_content_length(&src[..header_end]) else {
                tracing::warn!(
                    "Skipping frame header without Content-Length: {:?}",
                    String::from_utf8_lossy(&src[..header_end])
                );
                src.advance(body_start);
                continue;
            };

            let frame_end = match body_start.checked_add(length) {
                Some(end) if length <= self.max_body_bytes => end,
                _ => {
                    src.advance(body_start);
                    self.discard = length;
                    tracing::warn!(
                        "Dropping frame with Content-Length {} (limit {})",
                        length,
                        self.max_body_bytes
                    );
                    return Ok(Some(Frame::Oversized(format!(
                        "Content-Length {} exceeds limit of {} bytes",
                        length, self.max_body_bytes
                    ))));
                }
            };

            if src.len() < frame_end {
                src.reserve(frame_end - src.len());
                return Ok(None);
            }

            src.advance(body_start);
            let body = src.split_to(length);

            return Ok(Some(match serde_json::from_slice::<Value>(&body) {
                Ok(value) => Frame::Message(value),
                Err(e) => Frame::Invalid(e.to_string()),
            }));
        }
    }
}

/// Serialize `message` and write `Content-Length` header + body into `dst`.
pub fn encode_frame<T: Serialize>(message: &T, dst: &mut BytesMut) -> std::io::Result<()> {
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    dst.reserve(header.len() + body.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(&body);
    Ok(())
}

impl<T: Serialize> Encoder<T> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}
