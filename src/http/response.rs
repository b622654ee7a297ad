//! Client-facing responses built by the proxy.
//!
//! # Responsibilities
//! - Synthesize JSON responses (status document, errors)
//! - Re-serialize a rewritten upstream response with new framing
//! - Build the minimal response used when upstream framing was unusable
//!
//! # Design Decisions
//! - Everything the proxy writes itself carries `Connection: close`
//! - Upstream status line and headers are kept on rewritten responses;
//!   only framing and connection headers are replaced
//! - Error bodies carry a request id, never internal error detail

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;

use crate::http::message::ResponseHead;

const SERVER: &str = concat!("rerank-proxy/", env!("CARGO_PKG_VERSION"));

/// Headers replaced when the proxy re-frames an upstream response.
const REFRAMED: [HeaderName; 4] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::TRAILER,
];

fn put_status_line(out: &mut BytesMut, status: StatusCode, reason: &str) {
    let reason = if reason.is_empty() {
        status.canonical_reason().unwrap_or("")
    } else {
        reason
    };
    out.put_slice(format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason).as_bytes());
}

fn put_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
}

fn put_framing(out: &mut BytesMut, body: &[u8]) {
    put_header(out, "Content-Length", body.len().to_string().as_bytes());
    put_header(out, "Connection", b"close");
    out.put_slice(b"\r\n");
    out.put_slice(body);
}

/// A JSON response synthesized by the proxy.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Bytes {
    let body = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut out = BytesMut::with_capacity(128 + body.len());
    put_status_line(&mut out, status, "");
    put_header(&mut out, "Server", SERVER.as_bytes());
    put_header(&mut out, "Content-Type", b"application/json");
    put_framing(&mut out, &body);
    out.freeze()
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    status: u16,
    request_id: &'a str,
}

/// A JSON error response.
pub fn error(status: StatusCode, message: &str, request_id: &str) -> Bytes {
    json(
        status,
        &ErrorBody {
            error: message,
            status: status.as_u16(),
            request_id,
        },
    )
}

/// Upstream response with a replaced body.
pub fn rewrite(head: &ResponseHead, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(256 + body.len());
    put_status_line(&mut out, head.status, &head.reason);
    for (name, value) in head.headers.iter() {
        if REFRAMED.contains(name) || name.as_str() == "keep-alive" {
            continue;
        }
        put_header(&mut out, name.as_str(), value.as_bytes());
    }
    put_framing(&mut out, body);
    out.freeze()
}

/// Response used when upstream framing could not be trusted.
///
/// Only the status, content type and body survive.
pub fn minimal(status: StatusCode, content_type: Option<&HeaderValue>, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(128 + body.len());
    put_status_line(&mut out, status, "");
    put_header(&mut out, "Server", SERVER.as_bytes());
    if let Some(content_type) = content_type {
        put_header(&mut out, "Content-Type", content_type.as_bytes());
    }
    put_framing(&mut out, body);
    out.freeze()
}
