//! Trivial models, mostly useful for wiring checks.

use super::{RankError, Ranker};

/// Keeps upstream order.
#[derive(Debug, Default)]
pub struct IdentityRanker;

impl Ranker for IdentityRanker {
    fn name(&self) -> &str {
        "identity"
    }

    fn rank(&self, top_k: usize, _query: &str, candidates: &[String]) -> Result<Vec<usize>, RankError> {
        Ok((0..candidates.len()).take(top_k).collect())
    }
}

/// Reverses upstream order.
#[derive(Debug, Default)]
pub struct ReverseRanker;

impl Ranker for ReverseRanker {
    fn name(&self) -> &str {
        "reverse"
    }

    fn rank(&self, top_k: usize, _query: &str, candidates: &[String]) -> Result<Vec<usize>, RankError> {
        Ok((0..candidates.len()).rev().take(top_k).collect())
    }
}
