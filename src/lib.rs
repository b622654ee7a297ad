//! Selective re-ranking reverse proxy library.
//!
//! Sits in front of a search engine, relays everything it does not
//! understand byte for byte, and re-orders the results of search calls
//! with a pluggable ranking model.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod ranking;
pub mod routing;
pub mod search;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use ranking::{ModelRegistry, RankError, Ranker};
