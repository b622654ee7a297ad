//! Incremental HTTP/1.x message boundary detection.
//!
//! # Responsibilities
//! - Parse the request line / status line and header section with `httparse`
//! - Select a termination rule once headers are known
//! - Track body progress across arbitrarily split reads
//! - Decode chunked bodies when the caller wants the body retained
//!
//! # Design Decisions
//! - The parser never owns the raw stream; callers that need the exact bytes
//!   keep them in a [`Capture`](crate::http::capture::Capture)
//! - Only unprocessed bytes are held internally, so streaming a large
//!   passthrough response does not grow memory
//! - A zero-byte read is end-of-stream and must be reported via [`MessageParser::finish`]

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

/// Maximum number of headers accepted in one message.
const MAX_HEADERS: usize = 100;

/// Default limit on the header section size.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// Which side of the exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => f.write_str("request"),
            MessageKind::Response => f.write_str("response"),
        }
    }
}

/// Errors raised while detecting message boundaries.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid {kind} head: {source}")]
    InvalidHead {
        kind: MessageKind,
        #[source]
        source: httparse::Error,
    },
    #[error("{kind} header section exceeds {limit} bytes")]
    HeadTooLarge { kind: MessageKind, limit: usize },
    #[error("unframeable {kind}: {reason}")]
    Unframed {
        kind: MessageKind,
        reason: &'static str,
    },
    #[error("invalid chunk encoding in {kind}")]
    InvalidChunk { kind: MessageKind },
    #[error("{kind} truncated: stream closed before the message was complete")]
    Truncated { kind: MessageKind },
}

impl MessageError {
    /// The side of the exchange the error was detected on.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageError::InvalidHead { kind, .. }
            | MessageError::HeadTooLarge { kind, .. }
            | MessageError::Unframed { kind, .. }
            | MessageError::InvalidChunk { kind }
            | MessageError::Truncated { kind } => *kind,
        }
    }
}

/// Parsed request line and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Request target exactly as sent (origin-form for a reverse proxy).
    pub target: String,
    /// Minor HTTP version (`1` for HTTP/1.1).
    pub version: u8,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Path component of the target, without query string.
    pub fn path(&self) -> &str {
        let end = self.target.find(['?', '#']).unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// Raw query string of the target, if any.
    pub fn query(&self) -> Option<&str> {
        let (_, rest) = self.target.split_once('?')?;
        Some(rest.split('#').next().unwrap_or(rest))
    }
}

/// Parsed status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub reason: String,
    /// Minor HTTP version (`1` for HTTP/1.1).
    pub version: u8,
    pub headers: HeaderMap,
}

/// Parsed message head.
#[derive(Debug, Clone)]
pub enum MessageHead {
    Request(RequestHead),
    Response(ResponseHead),
}

impl MessageHead {
    pub fn headers(&self) -> &HeaderMap {
        match self {
            MessageHead::Request(head) => &head.headers,
            MessageHead::Response(head) => &head.headers,
        }
    }
}

/// Termination rule selected from the header section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Body ends with a zero-length chunk.
    Chunked,
    /// Body is exactly this many bytes.
    Length(u64),
    /// Body runs until the peer closes the connection.
    CloseDelimited,
}

/// Position inside a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

/// Incremental boundary detector for one HTTP message.
#[derive(Debug)]
pub struct MessageParser {
    kind: MessageKind,
    /// Method of the request this response answers, if known.
    request_method: Option<Method>,
    max_header_bytes: usize,
    retain_body: bool,
    /// Bytes fed but not yet consumed by the state machine.
    pending: BytesMut,
    head: Option<MessageHead>,
    head_len: usize,
    framing: Option<Framing>,
    remaining: u64,
    chunk: ChunkState,
    body: BytesMut,
    body_len: u64,
    complete: bool,
}

impl MessageParser {
    /// Create a detector for a client request.
    pub fn request() -> Self {
        Self::new(MessageKind::Request, None)
    }

    /// Create a detector for a response to a request with `method`.
    ///
    /// The method matters because responses to `HEAD` never carry a body.
    pub fn response(method: Option<&Method>) -> Self {
        Self::new(MessageKind::Response, method.cloned())
    }

    fn new(kind: MessageKind, request_method: Option<Method>) -> Self {
        Self {
            kind,
            request_method,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            retain_body: true,
            pending: BytesMut::new(),
            head: None,
            head_len: 0,
            framing: None,
            remaining: 0,
            chunk: ChunkState::Size,
            body: BytesMut::new(),
            body_len: 0,
            complete: false,
        }
    }

    /// Limit the size of the header section.
    pub fn with_max_header_bytes(mut self, limit: usize) -> Self {
        self.max_header_bytes = limit;
        self
    }

    /// Choose whether body bytes are kept for [`MessageParser::body`].
    ///
    /// Bytes already retained are kept; the switch only affects later input.
    pub fn set_retain_body(&mut self, retain: bool) {
        self.retain_body = retain;
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Parsed head, once the header section has been received.
    pub fn head(&self) -> Option<&MessageHead> {
        self.head.as_ref()
    }

    pub fn request_head(&self) -> Option<&RequestHead> {
        match &self.head {
            Some(MessageHead::Request(head)) => Some(head),
            _ => None,
        }
    }

    pub fn response_head(&self) -> Option<&ResponseHead> {
        match &self.head {
            Some(MessageHead::Response(head)) => Some(head),
            _ => None,
        }
    }

    /// Offset of the first body byte in the raw stream, interim heads included.
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    /// Termination rule, once headers are known and a body is expected.
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Body bytes received so far (de-chunked), if retained.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of body bytes seen so far, retained or not.
    pub fn body_len(&self) -> u64 {
        self.body_len
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed the next chunk of bytes.
    ///
    /// Returns whether the message is complete. Bytes arriving after
    /// completion are ignored. An empty slice is end-of-stream, handled as
    /// by [`MessageParser::finish`].
    pub fn feed(&mut self, data: &[u8]) -> Result<bool, MessageError> {
        if self.complete {
            return Ok(true);
        }
        if data.is_empty() {
            self.finish()?;
            return Ok(self.complete);
        }
        self.pending.extend_from_slice(data);

        while self.head.is_none() {
            if !self.parse_head()? {
                return Ok(false);
            }
        }

        self.advance_body()?;
        Ok(self.complete)
    }

    /// Signal end-of-stream.
    ///
    /// Completes a close-delimited response; anything else that is still
    /// incomplete is truncated.
    pub fn finish(&mut self) -> Result<(), MessageError> {
        if self.complete {
            return Ok(());
        }
        if self.framing == Some(Framing::CloseDelimited) {
            self.complete = true;
            return Ok(());
        }
        Err(MessageError::Truncated { kind: self.kind })
    }

    /// Try to parse a head from pending bytes. Returns false when more input is needed.
    fn parse_head(&mut self) -> Result<bool, MessageError> {
        let parsed = match self.kind {
            MessageKind::Request => parse_request_head(&self.pending),
            MessageKind::Response => parse_response_head(&self.pending),
        };
        let (len, head) = match parsed {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                if self.pending.len() > self.max_header_bytes {
                    return Err(MessageError::HeadTooLarge {
                        kind: self.kind,
                        limit: self.max_header_bytes,
                    });
                }
                return Ok(false);
            }
            Err(source) => {
                return Err(MessageError::InvalidHead {
                    kind: self.kind,
                    source,
                })
            }
        };
        if len > self.max_header_bytes {
            return Err(MessageError::HeadTooLarge {
                kind: self.kind,
                limit: self.max_header_bytes,
            });
        }
        self.pending.advance(len);
        self.head_len += len;

        // Interim responses precede the real one.
        if let MessageHead::Response(response) = &head {
            if response.status.is_informational() && response.status != StatusCode::SWITCHING_PROTOCOLS {
                return Ok(true);
            }
        }

        self.framing = self.select_framing(&head)?;
        self.head = Some(head);
        match self.framing {
            None => self.complete = true,
            Some(Framing::Length(n)) => self.remaining = n,
            Some(_) => {}
        }
        Ok(true)
    }

    fn select_framing(&self, head: &MessageHead) -> Result<Option<Framing>, MessageError> {
        let headers = head.headers();

        if let MessageHead::Response(response) = head {
            let status = response.status;
            if status == StatusCode::SWITCHING_PROTOCOLS {
                return Ok(Some(Framing::CloseDelimited));
            }
            if self.request_method == Some(Method::HEAD)
                || status == StatusCode::NO_CONTENT
                || status == StatusCode::NOT_MODIFIED
            {
                return Ok(None);
            }
        }

        let mut encodings = headers.get_all(http::header::TRANSFER_ENCODING).iter().peekable();
        if encodings.peek().is_some() {
            if headers.contains_key(http::header::CONTENT_LENGTH) {
                return Err(self.unframed("both transfer-encoding and content-length present"));
            }
            let last = encodings
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .last();
            return match last {
                Some(coding) if coding.eq_ignore_ascii_case("chunked") => Ok(Some(Framing::Chunked)),
                _ if self.kind == MessageKind::Response => Ok(Some(Framing::CloseDelimited)),
                _ => Err(self.unframed("request transfer-encoding is not chunked")),
            };
        }

        let mut lengths = headers.get_all(http::header::CONTENT_LENGTH).iter();
        if let Some(first) = lengths.next() {
            let length = parse_content_length(first).ok_or_else(|| self.unframed("invalid content-length"))?;
            for other in lengths {
                if parse_content_length(other) != Some(length) {
                    return Err(self.unframed("conflicting content-length values"));
                }
            }
            return Ok(if length == 0 { None } else { Some(Framing::Length(length)) });
        }

        match self.kind {
            // RFC 9112 §6.3: no framing headers on a request means no body.
            MessageKind::Request => Ok(None),
            MessageKind::Response => Ok(Some(Framing::CloseDelimited)),
        }
    }

    fn unframed(&self, reason: &'static str) -> MessageError {
        MessageError::Unframed {
            kind: self.kind,
            reason,
        }
    }

    fn advance_body(&mut self) -> Result<(), MessageError> {
        match self.framing {
            None => {}
            Some(Framing::CloseDelimited) => {
                let data = self.pending.split();
                self.take_body(&data);
            }
            Some(Framing::Length(_)) => {
                let n = (self.remaining.min(self.pending.len() as u64)) as usize;
                let data = self.pending.split_to(n);
                self.take_body(&data);
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    self.complete = true;
                }
            }
            Some(Framing::Chunked) => self.advance_chunked()?,
        }
        Ok(())
    }

    fn advance_chunked(&mut self) -> Result<(), MessageError> {
        while !self.complete {
            match self.chunk {
                ChunkState::Size => match httparse::parse_chunk_size(&self.pending) {
                    Ok(httparse::Status::Complete((used, size))) => {
                        self.pending.advance(used);
                        self.chunk = if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data(size)
                        };
                    }
                    Ok(httparse::Status::Partial) => return Ok(()),
                    Err(_) => return Err(MessageError::InvalidChunk { kind: self.kind }),
                },
                ChunkState::Data(left) => {
                    if self.pending.is_empty() {
                        return Ok(());
                    }
                    let n = (left.min(self.pending.len() as u64)) as usize;
                    let data = self.pending.split_to(n);
                    self.take_body(&data);
                    let left = left - n as u64;
                    self.chunk = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                }
                ChunkState::DataEnd => {
                    if self.pending.len() < 2 {
                        return Ok(());
                    }
                    if &self.pending[..2] != b"\r\n" {
                        return Err(MessageError::InvalidChunk { kind: self.kind });
                    }
                    self.pending.advance(2);
                    self.chunk = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(end) = find_crlf(&self.pending) else {
                        return Ok(());
                    };
                    self.pending.advance(end + 2);
                    // An empty line ends the trailer section.
                    if end == 0 {
                        self.complete = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn take_body(&mut self, data: &[u8]) {
        self.body_len += data.len() as u64;
        if self.retain_body {
            self.body.extend_from_slice(data);
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_content_length(value: &HeaderValue) -> Option<u64> {
    let text = value.to_str().ok()?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn to_header_map(raw: &[httparse::Header<'_>]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_bytes(header.value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    headers
}

/// Parse a request head from `buf`. Returns `None` when incomplete.
pub fn parse_request_head(buf: &[u8]) -> Result<Option<(usize, MessageHead)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(buf)? {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };
    let method = req
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or(httparse::Error::Token)?;
    let head = RequestHead {
        method,
        target: req.path.unwrap_or("/").to_string(),
        version: req.version.unwrap_or(1),
        headers: to_header_map(req.headers),
    };
    Ok(Some((len, MessageHead::Request(head))))
}

/// Parse a response head from `buf`. Returns `None` when incomplete.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<(usize, MessageHead)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    let len = match res.parse(buf)? {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };
    let status = res
        .code
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or(httparse::Error::Status)?;
    let head = ResponseHead {
        status,
        reason: res.reason.unwrap_or_default().to_string(),
        version: res.version.unwrap_or(1),
        headers: to_header_map(res.headers),
    };
    Ok(Some((len, MessageHead::Response(head))))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNKED: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

    /// Feed `data` in pieces of `step` bytes, returning the byte offset at which
    /// completion was first reported.
    fn complete_at(parser: &mut MessageParser, data: &[u8], step: usize) -> Option<usize> {
        let mut fed = 0;
        for piece in data.chunks(step) {
            fed += piece.len();
            if parser.feed(piece).unwrap() {
                return Some(fed);
            }
        }
        None
    }

    #[test]
    fn chunked_completes_exactly_at_terminator() {
        for step in 1..=CHUNKED.len() {
            let mut parser = MessageParser::response(None);
            let at = complete_at(&mut parser, CHUNKED, step);
            let expected = CHUNKED.len().div_ceil(step) * step;
            assert_eq!(at, Some(expected.min(CHUNKED.len())), "step {step}");
            assert_eq!(parser.body(), b"Wikipedia");
        }
    }

    #[test]
    fn chunked_not_complete_before_final_crlf() {
        let mut parser = MessageParser::response(None);
        assert!(!parser.feed(&CHUNKED[..CHUNKED.len() - 1]).unwrap());
        assert!(parser.feed(b"\n").unwrap());
    }

    #[test]
    fn chunked_with_extensions_and_trailers() {
        let mut parser = MessageParser::request();
        let msg = b"POST /x HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n3;ext=1\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n";
        assert!(parser.feed(msg).unwrap());
        assert_eq!(parser.body(), b"abc");
        assert_eq!(parser.framing(), Some(Framing::Chunked));
    }

    #[test]
    fn chunked_rejects_garbage_size() {
        let mut parser = MessageParser::response(None);
        let err = parser
            .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n")
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidChunk { .. }));
    }

    #[test]
    fn content_length_completes_exactly() {
        let msg = b"POST /_search HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        for step in 1..=msg.len() {
            let mut parser = MessageParser::request();
            assert_eq!(complete_at(&mut parser, msg, step), Some(msg.len()), "step {step}");
            assert_eq!(parser.body(), b"hello");
        }
    }

    #[test]
    fn content_length_ignores_excess_bytes() {
        let mut parser = MessageParser::request();
        assert!(parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\nabcdef").unwrap());
        assert_eq!(parser.body(), b"ab");
    }

    #[test]
    fn request_without_framing_has_empty_body() {
        let mut parser = MessageParser::request();
        assert!(!parser.feed(b"GET /health HTTP/1.1\r\nHost: x\r\n").unwrap());
        assert!(parser.head().is_none());
        assert!(parser.feed(b"\r\n").unwrap());
        assert_eq!(parser.request_head().unwrap().path(), "/health");
        assert_eq!(parser.framing(), None);
    }

    #[test]
    fn request_with_unknown_coding_is_malformed() {
        let mut parser = MessageParser::request();
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, MessageError::Unframed { kind: MessageKind::Request, .. }));
    }

    #[test]
    fn conflicting_lengths_are_malformed() {
        let mut parser = MessageParser::request();
        let err = parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, MessageError::Unframed { .. }));

        let mut parser = MessageParser::request();
        assert!(parser
            .feed(b"POST / HTTP/1.1\r\nContent-Length: +3\r\n\r\n")
            .is_err());
    }

    #[test]
    fn close_delimited_response_needs_eof() {
        let mut parser = MessageParser::response(Some(&Method::GET));
        assert!(!parser.feed(b"HTTP/1.0 200 OK\r\n\r\nsome body").unwrap());
        assert!(!parser.feed(b" more").unwrap());
        parser.finish().unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.body(), b"some body more");
    }

    #[test]
    fn empty_feed_is_end_of_stream() {
        let mut parser = MessageParser::response(Some(&Method::GET));
        assert!(!parser.feed(b"HTTP/1.0 200 OK\r\n\r\nbody").unwrap());
        assert!(parser.feed(b"").unwrap());
        assert!(parser.is_complete());
        assert_eq!(parser.body(), b"body");

        let mut parser = MessageParser::request();
        assert!(!parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").unwrap());
        assert!(matches!(
            parser.feed(b""),
            Err(MessageError::Truncated { kind: MessageKind::Request })
        ));

        let mut parser = MessageParser::request();
        assert!(parser.feed(b"").is_err());
    }

    #[test]
    fn truncated_request_fails_on_finish() {
        let mut parser = MessageParser::request();
        parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").unwrap();
        assert!(matches!(
            parser.finish(),
            Err(MessageError::Truncated { kind: MessageKind::Request })
        ));

        let mut parser = MessageParser::request();
        parser.feed(b"GET / HT").unwrap();
        assert!(parser.finish().is_err());
    }

    #[test]
    fn head_response_has_no_body() {
        let mut parser = MessageParser::response(Some(&Method::HEAD));
        assert!(parser
            .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n")
            .unwrap());
        assert_eq!(parser.body_len(), 0);
    }

    #[test]
    fn interim_responses_are_skipped() {
        let mut parser = MessageParser::response(Some(&Method::POST));
        assert!(!parser.feed(b"HTTP/1.1 100 Continue\r\n\r\n").unwrap());
        assert!(parser.head().is_none());
        assert!(parser
            .feed(b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok")
            .unwrap());
        assert_eq!(parser.response_head().unwrap().status, StatusCode::CREATED);
        assert_eq!(parser.head_len(), 68);
    }

    #[test]
    fn no_content_completes_at_head() {
        let mut parser = MessageParser::response(Some(&Method::GET));
        assert!(parser.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap());
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut parser = MessageParser::request().with_max_header_bytes(32);
        let err = parser
            .feed(b"GET / HTTP/1.1\r\nX-Padding: aaaaaaaaaaaaaaaaaaaaaaaa\r\n")
            .unwrap_err();
        assert!(matches!(err, MessageError::HeadTooLarge { .. }));
    }

    #[test]
    fn body_retention_can_be_disabled() {
        let mut parser = MessageParser::response(None);
        parser.set_retain_body(false);
        assert!(parser
            .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc")
            .unwrap());
        assert_eq!(parser.body(), b"");
        assert_eq!(parser.body_len(), 3);
    }

    #[test]
    fn target_path_and_query() {
        let mut parser = MessageParser::request();
        parser.feed(b"GET /idx/_search?q=cats&size=3 HTTP/1.1\r\n\r\n").unwrap();
        let head = parser.request_head().unwrap();
        assert_eq!(head.path(), "/idx/_search");
        assert_eq!(head.query(), Some("q=cats&size=3"));
    }
}
