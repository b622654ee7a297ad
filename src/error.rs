//! Error taxonomy for connection handling.

use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::http::message::{MessageError, MessageKind};
use crate::ranking::RankError;

/// Everything that can go wrong while serving one connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Message framing could not be determined.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] MessageError),

    #[error("{kind} exceeds the {limit} byte limit")]
    MessageTooLarge { kind: MessageKind, limit: usize },

    #[error("{kind} stalled for longer than the idle timeout")]
    Timeout { kind: MessageKind },

    #[error("failed to connect to upstream {addr}: {source}")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to upstream {addr}")]
    UpstreamConnectTimeout { addr: String },

    #[error("upstream i/o error: {0}")]
    UpstreamIo(#[source] io::Error),

    #[error("client i/o error: {0}")]
    ClientIo(#[source] io::Error),

    #[error("ranking failed: {0}")]
    Model(#[from] RankError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Status code of the synthesized response for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MalformedMessage(err) if err.kind() == MessageKind::Request => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::MessageTooLarge {
                kind: MessageKind::Request,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Timeout {
                kind: MessageKind::Request,
            } => StatusCode::REQUEST_TIMEOUT,
            ProxyError::Timeout {
                kind: MessageKind::Response,
            }
            | ProxyError::UpstreamConnectTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::MalformedMessage(_)
            | ProxyError::MessageTooLarge { .. }
            | ProxyError::UpstreamConnect { .. }
            | ProxyError::UpstreamIo(_) => StatusCode::BAD_GATEWAY,
            ProxyError::ClientIo(_) | ProxyError::Model(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure happened while talking to the upstream server.
    pub fn is_upstream(&self) -> bool {
        match self {
            ProxyError::UpstreamConnect { .. }
            | ProxyError::UpstreamConnectTimeout { .. }
            | ProxyError::UpstreamIo(_) => true,
            ProxyError::Timeout { kind } => *kind == MessageKind::Response,
            _ => false,
        }
    }

    /// Short client-facing description that leaks no internal detail.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "malformed request",
            StatusCode::PAYLOAD_TOO_LARGE => "request too large",
            StatusCode::REQUEST_TIMEOUT => "request timed out",
            StatusCode::GATEWAY_TIMEOUT => "upstream timed out",
            StatusCode::BAD_GATEWAY => "upstream unavailable",
            _ => "internal proxy error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_side_errors_map_to_client_statuses() {
        let err = ProxyError::MessageTooLarge {
            kind: MessageKind::Request,
            limit: 10,
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = ProxyError::MalformedMessage(MessageError::Truncated {
            kind: MessageKind::Request,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_upstream());
    }

    #[test]
    fn upstream_errors_map_to_gateway_statuses() {
        let err = ProxyError::UpstreamConnect {
            addr: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_upstream());
        assert_eq!(err.public_message(), "upstream unavailable");

        let err = ProxyError::Timeout {
            kind: MessageKind::Response,
        };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = ProxyError::Internal("secret stack trace".into());
        assert_eq!(err.public_message(), "internal proxy error");
    }
}
