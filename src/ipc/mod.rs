//! Transports: framed stdio JSON-RPC and the HTTP adapter.

pub mod framing;
pub mod http;
pub mod protocol;
pub mod server;
