//! Ranking model subsystem.
//!
//! # Data Flow
//! ```text
//! config.model.name
//!     → registry.rs (identifier → factory, only the chosen one runs)
//!     → Arc<dyn Ranker> shared by every connection
//!
//! Search response
//!     → Ranker::rank(top_k, query, candidates)
//!     → validate_ranking (in range, no duplicates, at most top_k)
//!     → reordered response body
//! ```
//!
//! # Design Decisions
//! - Models are synchronous; callers run them on the blocking pool
//! - Model output is never trusted; invalid rankings are errors

pub mod builtin;
pub mod lexical;
pub mod registry;

use std::collections::HashSet;

use thiserror::Error;

pub use builtin::{IdentityRanker, ReverseRanker};
pub use lexical::LexicalRanker;
pub use registry::{ModelFactory, ModelRegistry};

/// Failures of a ranking model.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model returned index {index} for {len} candidates")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("model returned index {0} more than once")]
    DuplicateIndex(usize),

    #[error("model failed: {0}")]
    Failed(String),
}

/// A re-ranking model.
///
/// Given a query and the candidate texts in upstream order, returns candidate
/// indices from most to least relevant. Returning fewer than `top_k` indices
/// is allowed.
pub trait Ranker: Send + Sync + std::fmt::Debug {
    /// Registry identifier, reported in logs and the status document.
    fn name(&self) -> &str;

    fn rank(&self, top_k: usize, query: &str, candidates: &[String]) -> Result<Vec<usize>, RankError>;
}

/// Check a model's output against the candidate list.
pub fn validate_ranking(ranking: &[usize], len: usize) -> Result<(), RankError> {
    let mut seen = HashSet::with_capacity(ranking.len());
    for &index in ranking {
        if index >= len {
            return Err(RankError::IndexOutOfRange { index, len });
        }
        if !seen.insert(index) {
            return Err(RankError::DuplicateIndex(index));
        }
    }
    Ok(())
}

/// Run `ranker` and validate its output, truncated to `top_k`.
pub fn rank_checked(
    ranker: &dyn Ranker,
    top_k: usize,
    query: &str,
    candidates: &[String],
) -> Result<Vec<usize>, RankError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let mut ranking = ranker.rank(top_k, query, candidates)?;
    validate_ranking(&ranking, candidates.len())?;
    ranking.truncate(top_k);
    Ok(ranking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(Vec<usize>);

    impl Ranker for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn rank(&self, _: usize, _: &str, _: &[String]) -> Result<Vec<usize>, RankError> {
            Ok(self.0.clone())
        }
    }

    fn candidates(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("doc {i}")).collect()
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = rank_checked(&Fixed(vec![0, 3]), 10, "q", &candidates(3)).unwrap_err();
        assert!(matches!(err, RankError::IndexOutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = rank_checked(&Fixed(vec![1, 1]), 10, "q", &candidates(3)).unwrap_err();
        assert!(matches!(err, RankError::DuplicateIndex(1)));
    }

    #[test]
    fn output_is_truncated_to_top_k() {
        let ranking = rank_checked(&Fixed(vec![2, 0, 1]), 2, "q", &candidates(3)).unwrap();
        assert_eq!(ranking, vec![2, 0]);
    }

    #[test]
    fn empty_candidates_skip_the_model() {
        let ranking = rank_checked(&Fixed(vec![7]), 2, "q", &[]).unwrap();
        assert!(ranking.is_empty());
    }
}
