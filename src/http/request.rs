//! Upstream request construction for intercepted searches.
//!
//! # Responsibilities
//! - Re-serialize a parsed request head
//! - Drop framing and connection-scoped headers
//! - Frame the (possibly rewritten) body with a fresh Content-Length
//!
//! # Design Decisions
//! - Forwarded headers keep the client's order and values; names are lowercased
//! - `Accept-Encoding` is dropped so the response body stays parseable JSON
//! - Every upstream request carries `Connection: close`

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderName};

use crate::http::message::RequestHead;

/// Headers that never travel to upstream on a rewritten request.
const STRIPPED: [HeaderName; 7] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::ACCEPT_ENCODING,
    header::EXPECT,
    header::TE,
    header::TRAILER,
];

fn is_stripped(name: &HeaderName) -> bool {
    STRIPPED.contains(name) || name.as_str() == "keep-alive" || name.as_str() == "proxy-connection"
}

/// Serialize `head` with `body` as a self-contained HTTP/1.1 request.
pub fn build_upstream_request(head: &RequestHead, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(256 + body.len());
    out.put_slice(head.method.as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(head.target.as_bytes());
    out.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in head.headers.iter().filter(|(name, _)| !is_stripped(name)) {
        out.put_slice(name.as_str().as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    }
    if !body.is_empty() || head.method == http::Method::POST {
        out.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    out.put_slice(b"Connection: close\r\n\r\n");
    out.put_slice(body);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::MessageParser;

    fn parse(raw: &[u8]) -> MessageParser {
        let mut parser = MessageParser::request();
        assert!(parser.feed(raw).unwrap());
        parser
    }

    #[test]
    fn rewrites_framing_and_connection() {
        let parser = parse(
            b"POST /idx/_search?pretty HTTP/1.1\r\nHost: es\r\nTransfer-Encoding: chunked\r\n\
              Connection: keep-alive\r\nAccept-Encoding: gzip\r\nX-Trace: 1\r\n\r\n3\r\n{}\n\r\n0\r\n\r\n",
        );
        let head = parser.request_head().unwrap();
        let out = build_upstream_request(head, br#"{"query":"x"}"#);
        let text = std::str::from_utf8(&out).unwrap();

        assert!(text.starts_with("POST /idx/_search?pretty HTTP/1.1\r\n"));
        assert!(text.contains("host: es\r\n"));
        assert!(text.contains("x-trace: 1\r\n"));
        assert!(text.contains("Content-Length: 13\r\n"));
        assert!(text.contains("Connection: close\r\n\r\n"));
        assert!(!text.contains("chunked"));
        assert!(!text.contains("gzip"));
        assert!(!text.contains("keep-alive"));
        assert!(text.ends_with(r#"{"query":"x"}"#));
    }

    #[test]
    fn result_is_a_complete_message() {
        let parser = parse(b"GET /_search?q=cats HTTP/1.1\r\nHost: es\r\n\r\n");
        let out = build_upstream_request(parser.request_head().unwrap(), b"");
        let reparsed = parse(&out);
        assert_eq!(reparsed.request_head().unwrap().target, "/_search?q=cats");
        assert!(reparsed.body().is_empty());
    }
}
