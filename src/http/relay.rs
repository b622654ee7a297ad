//! Byte-level relaying between client and upstream.
//!
//! # Responsibilities
//! - Pull bytes into a [`Capture`] until a boundary detector is satisfied
//! - Forward captured bytes verbatim
//! - Stream an upstream response to the client without modification
//!
//! # Design Decisions
//! - Every read is bounded by the idle timeout
//! - A zero-byte read is end-of-stream and is reported to the detector
//! - Streaming relay keeps going until upstream closes if framing is lost
//! - A response that never starts is an upstream failure

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;
use crate::http::capture::Capture;
use crate::http::message::{MessageKind, MessageParser};

/// Size of the scratch buffer used for streaming relay.
const RELAY_CHUNK: usize = 16 * 1024;

fn io_error(kind: MessageKind, err: std::io::Error) -> ProxyError {
    match kind {
        MessageKind::Request => ProxyError::ClientIo(err),
        MessageKind::Response => ProxyError::UpstreamIo(err),
    }
}

/// Reads once into `capture` and feeds the new bytes to `parser`.
///
/// Returns whether the message is complete.
pub async fn fill<R: AsyncRead + Unpin>(
    capture: &mut Capture<R>,
    parser: &mut MessageParser,
    idle: Duration,
    limit: usize,
) -> Result<bool, ProxyError> {
    let kind = parser.kind();
    if capture.is_full() {
        return Err(ProxyError::MessageTooLarge { kind, limit });
    }
    let chunk = tokio::time::timeout(idle, capture.read_more())
        .await
        .map_err(|_| ProxyError::Timeout { kind })?
        .map_err(|e| io_error(kind, e))?;

    tracing::trace!(bytes = chunk.len(), %kind, "read");
    Ok(parser.feed(chunk)?)
}

/// Reads until the message head has been parsed (or the message is complete).
pub async fn read_head<R: AsyncRead + Unpin>(
    capture: &mut Capture<R>,
    parser: &mut MessageParser,
    idle: Duration,
    limit: usize,
) -> Result<(), ProxyError> {
    while parser.head().is_none() && !parser.is_complete() {
        fill(capture, parser, idle, limit).await?;
    }
    Ok(())
}

/// Reads until the boundary detector reports a complete message.
pub async fn read_to_completion<R: AsyncRead + Unpin>(
    capture: &mut Capture<R>,
    parser: &mut MessageParser,
    idle: Duration,
    limit: usize,
) -> Result<(), ProxyError> {
    while !parser.is_complete() {
        fill(capture, parser, idle, limit).await?;
    }
    Ok(())
}

/// Writes `bytes` to `writer` unchanged.
pub async fn forward_raw<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &Bytes) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Result of streaming a response through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The detector saw the end of the message.
    Complete,
    /// Framing was lost; bytes were copied until upstream closed.
    UntilClose,
}

/// Streams the upstream response to the client byte for byte.
///
/// `written` is updated as bytes reach the client so the caller knows whether
/// a response has already started if this returns an error.
pub async fn relay_response<U, C>(
    upstream: &mut U,
    client: &mut C,
    parser: &mut MessageParser,
    idle: Duration,
    written: &mut u64,
) -> Result<RelayEnd, ProxyError>
where
    U: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    parser.set_retain_body(false);
    let mut buf = vec![0u8; RELAY_CHUNK];

    loop {
        let n = read_upstream(upstream, &mut buf, idle).await?;
        if n == 0 {
            if *written == 0 {
                return Err(ProxyError::UpstreamIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "upstream closed without responding",
                )));
            }
            if let Err(err) = parser.finish() {
                tracing::warn!(error = %err, relayed = *written, "Upstream closed mid-response");
            }
            break;
        }

        client.write_all(&buf[..n]).await.map_err(ProxyError::ClientIo)?;
        *written += n as u64;

        match parser.feed(&buf[..n]) {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Lost response framing, relaying until upstream closes");
                copy_until_close(upstream, client, idle, written).await?;
                return Ok(RelayEnd::UntilClose);
            }
        }
    }

    client.flush().await.map_err(ProxyError::ClientIo)?;
    Ok(RelayEnd::Complete)
}

/// Copies whatever upstream still sends until it closes the connection.
pub async fn copy_until_close<U, C>(
    upstream: &mut U,
    client: &mut C,
    idle: Duration,
    written: &mut u64,
) -> Result<(), ProxyError>
where
    U: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_CHUNK];
    loop {
        let n = read_upstream(upstream, &mut buf, idle).await?;
        if n == 0 {
            break;
        }
        client.write_all(&buf[..n]).await.map_err(ProxyError::ClientIo)?;
        *written += n as u64;
    }
    client.flush().await.map_err(ProxyError::ClientIo)
}

async fn read_upstream<U: AsyncRead + Unpin>(
    upstream: &mut U,
    buf: &mut [u8],
    idle: Duration,
) -> Result<usize, ProxyError> {
    tokio::time::timeout(idle, upstream.read(buf))
        .await
        .map_err(|_| ProxyError::Timeout {
            kind: MessageKind::Response,
        })?
        .map_err(ProxyError::UpstreamIo)
}
