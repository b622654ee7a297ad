//! Request classification.
//!
//! Decides between status, search, missing-query and unknown. Status and
//! unknown are decided from the head alone so passthrough traffic never has
//! its body inspected.

use http::Method;

use super::matcher::{AndMatcher, AnyMatcher, ExactPathMatcher, Matcher, MethodMatcher, PathPatternMatcher};
use super::outcome::{Classification, Route};
use crate::config::{ProxyConfig, SearchConfig};
use crate::http::message::RequestHead;
use crate::search::SearchRequest;

/// Stateless classifier built from configuration.
#[derive(Debug)]
pub struct Classifier {
    status: ExactPathMatcher,
    search: AndMatcher,
    search_config: SearchConfig,
}

impl Classifier {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let patterns: Vec<Box<dyn Matcher>> = config
            .search
            .paths
            .iter()
            .map(|p| Box::new(PathPatternMatcher::new(p)) as Box<dyn Matcher>)
            .collect();

        Self {
            status: ExactPathMatcher::new(config.status.path.clone()),
            search: AndMatcher::new(vec![
                Box::new(MethodMatcher::new([Method::GET, Method::POST])),
                Box::new(AnyMatcher::new(patterns)),
            ]),
            search_config: config.search.clone(),
        }
    }

    /// Route from the request line and headers only.
    pub fn route(&self, head: &RequestHead) -> Route {
        if self.status.matches(head) {
            Route::Status
        } else if self.search.matches(head) {
            Route::Search
        } else {
            Route::Unknown
        }
    }

    /// Classify a complete request.
    pub fn classify(&self, head: &RequestHead, body: &[u8]) -> Classification {
        match self.route(head) {
            Route::Status => Classification::Status,
            Route::Unknown => Classification::Unknown,
            Route::Search => match SearchRequest::extract(head, body, &self.search_config) {
                Ok(search) => Classification::Search(search),
                Err(reason) => Classification::MissingQuery(reason),
            },
        }
    }
}
