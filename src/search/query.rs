//! Query extraction and upstream request rewriting.

use serde_json::Value;
use thiserror::Error;

use crate::config::SearchConfig;
use crate::http::message::RequestHead;

/// Why a search-path request cannot be intercepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("request body is not valid JSON")]
    InvalidJson,
    #[error("no query in body or URL")]
    MissingQuery,
    #[error("query field is not a non-empty string")]
    InvalidQuery,
    #[error("size field is not a positive integer")]
    InvalidSize,
}

/// A search request that will be re-ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Text handed to the model.
    pub query: String,
    /// Number of results the client wants back.
    pub top_k: usize,
    /// Parsed request body, if the request had one.
    pub body: Option<Value>,
}

impl SearchRequest {
    /// Extract the query and result count from a complete search request.
    pub fn extract(head: &RequestHead, body: &[u8], config: &SearchConfig) -> Result<Self, QueryError> {
        let body = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(serde_json::from_slice::<Value>(body).map_err(|_| QueryError::InvalidJson)?)
        };

        let from_body = body.as_ref().and_then(|b| b.pointer(&config.query_pointer));
        let query = match from_body {
            Some(Value::String(q)) if !q.trim().is_empty() => q.clone(),
            Some(_) => return Err(QueryError::InvalidQuery),
            None => url_param(head, &config.query_param)
                .filter(|q| !q.trim().is_empty())
                .ok_or(QueryError::MissingQuery)?,
        };

        let top_k = match body.as_ref().and_then(|b| b.pointer(&config.size_pointer)) {
            Some(size) => size
                .as_u64()
                .filter(|&n| n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or(QueryError::InvalidSize)?,
            None => config.default_top_k,
        };

        Ok(Self { query, top_k, body })
    }

    /// Body to send upstream, or `None` to forward the original bytes.
    ///
    /// With a multiplier above one, the size field asks upstream for
    /// `top_k * multiplier` candidates.
    pub fn upstream_body(&self, config: &SearchConfig) -> Option<Vec<u8>> {
        if config.multiplier <= 1 || config.size_pointer.is_empty() {
            return None;
        }
        let mut body = self.body.clone()?;
        let size = Value::from(self.top_k.saturating_mul(config.multiplier) as u64);
        if !set_pointer(&mut body, &config.size_pointer, size) {
            return None;
        }
        serde_json::to_vec(&body).ok()
    }
}

fn url_param(head: &RequestHead, name: &str) -> Option<String> {
    let query = head.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Replace the value at `pointer`, creating the last segment if its parent is an object.
fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> bool {
    if let Some(slot) = root.pointer_mut(pointer) {
        *slot = value;
        return true;
    }
    let Some((parent, key)) = pointer.rsplit_once('/') else {
        return false;
    };
    let key = key.replace("~1", "/").replace("~0", "~");
    match root.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(key, value);
            true
        }
        _ => false,
    }
}
