//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request head
//!     → classifier.rs route()  (status / search / unknown, head only)
//!     → [search only] full body
//!     → classifier.rs classify() (search / missing-query)
//!     → outcome.rs Classification → Outcome
//! ```
//!
//! # Design Decisions
//! - Matchers are built once from config and shared read-only
//! - Classification is a pure function of the request

pub mod classifier;
pub mod matcher;
pub mod outcome;

pub use classifier::Classifier;
pub use outcome::{Classification, Outcome, Route};
