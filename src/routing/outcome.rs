//! Protocol outcomes.

use crate::search::{QueryError, SearchRequest};

/// How a connection was resolved. Exactly one per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    StatusRequest,
    SearchRequest,
    UnknownRequest,
    MissingQuery,
    ResponseError,
    UpstreamConnectionError,
    InternalError,
    Success,
}

impl Outcome {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::StatusRequest => "status_request",
            Outcome::SearchRequest => "search_request",
            Outcome::UnknownRequest => "unknown_request",
            Outcome::MissingQuery => "missing_query",
            Outcome::ResponseError => "response_error",
            Outcome::UpstreamConnectionError => "upstream_connection_error",
            Outcome::InternalError => "internal_error",
            Outcome::Success => "success",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Head-only routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    /// Matches the search API; the body decides between search and missing-query.
    Search,
    Unknown,
}

/// Full classification of a complete request.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Status,
    Search(SearchRequest),
    Unknown,
    MissingQuery(QueryError),
}

impl Classification {
    pub fn outcome(&self) -> Outcome {
        match self {
            Classification::Status => Outcome::StatusRequest,
            Classification::Search(_) => Outcome::SearchRequest,
            Classification::Unknown => Outcome::UnknownRequest,
            Classification::MissingQuery(_) => Outcome::MissingQuery,
        }
    }
}
