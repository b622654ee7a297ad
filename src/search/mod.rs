//! Search payload handling.
//!
//! # Data Flow
//! ```text
//! Client request body / URL
//!     → query.rs (query text, requested size, rewritten upstream body)
//!
//! Upstream response body
//!     → results.rs (candidate texts, reorder by ranking)
//! ```
//!
//! All locations are RFC 6901 JSON pointers taken from [`SearchConfig`](crate::config::SearchConfig).

pub mod query;
pub mod results;

pub use query::{QueryError, SearchRequest};
pub use results::ResultsError;
