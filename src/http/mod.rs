//! HTTP/1.1 proxy subsystem.
//!
//! # Data Flow
//! ```text
//! TcpStream (client)
//!     → capture.rs (buffer every byte read)
//!     → message.rs (boundary detection, head parsing)
//!     → handler.rs (route, relay or intercept)
//!     → request.rs (rewritten search request)
//!     → relay.rs (verbatim forwarding, streamed passthrough)
//!     → response.rs (synthesized and rewritten responses)
//! ```
//!
//! # Design Decisions
//! - The proxy speaks HTTP/1.1 on raw sockets so passthrough stays byte-identical
//! - One request per connection; every connection closes after its response

pub mod capture;
pub mod handler;
pub mod message;
pub mod relay;
pub mod request;
pub mod response;
pub mod server;

pub use capture::Capture;
pub use handler::{ProxyContext, Stage};
pub use message::{Framing, MessageError, MessageKind, MessageParser, RequestHead, ResponseHead};
pub use server::ProxyServer;
