//! Term-overlap ranking.
//!
//! Scores each candidate by how many query terms it contains, weighted by
//! term frequency and damped by document length. Ties keep upstream order.

use std::collections::{HashMap, HashSet};

use super::{RankError, Ranker};

/// Saturation constant for term frequency.
const K1: f64 = 1.2;
/// Length normalisation strength.
const B: f64 = 0.75;

#[derive(Debug, Default)]
pub struct LexicalRanker;

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl LexicalRanker {
    fn scores(query: &str, candidates: &[String]) -> Vec<f64> {
        let terms: HashSet<String> = tokenize(query).collect();
        let docs: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(c).collect()).collect();
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f64 / docs.len().max(1) as f64;
        let n = docs.len() as f64;

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique.into_iter().filter(|t| terms.contains(*t)) {
                *doc_freq.entry(term).or_default() += 1;
            }
        }

        docs.iter()
            .map(|doc| {
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for token in doc {
                    if terms.contains(token) {
                        *tf.entry(token.as_str()).or_default() += 1;
                    }
                }
                let len_norm = 1.0 - B + B * doc.len() as f64 / avg_len.max(1.0);
                tf.into_iter()
                    .map(|(term, count)| {
                        let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let count = count as f64;
                        idf * count * (K1 + 1.0) / (count + K1 * len_norm)
                    })
                    .sum()
            })
            .collect()
    }
}

impl Ranker for LexicalRanker {
    fn name(&self) -> &str {
        "lexical"
    }

    fn rank(&self, top_k: usize, query: &str, candidates: &[String]) -> Result<Vec<usize>, RankError> {
        let scores = Self::scores(query, candidates);
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // Stable sort keeps upstream order among equal scores.
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(top_k);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matching_documents_move_up() {
        let candidates = docs(&["dogs and birds", "all about cats", "nothing here"]);
        let ranking = LexicalRanker.rank(3, "Cats", &candidates).unwrap();
        assert_eq!(ranking[0], 1);
    }

    #[test]
    fn ties_keep_upstream_order() {
        let candidates = docs(&["x", "y", "z"]);
        assert_eq!(LexicalRanker.rank(3, "cats", &candidates).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn more_matched_terms_rank_higher() {
        let candidates = docs(&["black dog", "black cat sleeping", "a cat"]);
        let ranking = LexicalRanker.rank(2, "black cat", &candidates).unwrap();
        assert_eq!(ranking, vec![1, 0]);
    }
}
