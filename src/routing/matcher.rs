//! Request matching logic.
//!
//! # Responsibilities
//! - Match the exact status path
//! - Match search path globs (`*` = exactly one segment)
//! - Restrict by method
//! - Combine conditions with AND / OR semantics
//!
//! # Design Decisions
//! - Only the request head is consulted; bodies are never needed to match
//! - Path matching is case-sensitive and ignores the query string
//! - No regex to guarantee O(n) matching

use http::Method;

use crate::http::message::RequestHead;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, head: &RequestHead) -> bool;
}

/// Matches one exact path.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, head: &RequestHead) -> bool {
        head.path() == self.path
    }
}

/// Matches a `/`-separated glob where `*` stands for one non-empty segment.
#[derive(Debug, Clone)]
pub struct PathPatternMatcher {
    segments: Vec<String>,
}

impl PathPatternMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: pattern.split('/').map(str::to_string).collect(),
        }
    }

    fn matches_path(&self, path: &str) -> bool {
        let mut parts = path.split('/');
        for segment in &self.segments {
            match parts.next() {
                Some(part) if segment == "*" && !part.is_empty() => {}
                Some(part) if *segment == part => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

impl Matcher for PathPatternMatcher {
    fn matches(&self, head: &RequestHead) -> bool {
        self.matches_path(head.path())
    }
}

/// Matches a set of methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, head: &RequestHead) -> bool {
        self.methods.contains(&head.method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &RequestHead) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, head: &RequestHead) -> bool {
        self.matchers.iter().any(|m| m.matches(head))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::message::{parse_request_head, MessageHead};

    pub(crate) fn head(method: &str, target: &str) -> RequestHead {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: es\r\n\r\n");
        match parse_request_head(raw.as_bytes()).unwrap() {
            Some((_, MessageHead::Request(head))) => head,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_exact_path_matcher() {
        let matcher = ExactPathMatcher::new("/health");
        assert!(matcher.matches(&head("GET", "/health")));
        assert!(matcher.matches(&head("GET", "/health?verbose=1")));
        assert!(!matcher.matches(&head("GET", "/health/deep")));
    }

    #[test]
    fn test_path_pattern_matcher() {
        let matcher = PathPatternMatcher::new("/*/_search");
        assert!(matcher.matches(&head("POST", "/books/_search")));
        assert!(matcher.matches(&head("POST", "/books/_search?q=x")));
        assert!(!matcher.matches(&head("POST", "/_search")));
        assert!(!matcher.matches(&head("POST", "//_search")));
        assert!(!matcher.matches(&head("POST", "/a/b/_search")));
        assert!(!matcher.matches(&head("POST", "/books/_search/x")));
    }

    #[test]
    fn test_combinators() {
        let search = AndMatcher::new(vec![
            Box::new(MethodMatcher::new([Method::GET, Method::POST])),
            Box::new(AnyMatcher::new(vec![
                Box::new(PathPatternMatcher::new("/_search")),
                Box::new(PathPatternMatcher::new("/*/_search")),
            ])),
        ]);
        assert!(search.matches(&head("POST", "/_search")));
        assert!(search.matches(&head("GET", "/idx/_search")));
        assert!(!search.matches(&head("DELETE", "/idx/_search")));
        assert!(!search.matches(&head("POST", "/idx/_doc")));
    }
}
