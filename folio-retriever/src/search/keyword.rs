//! Lexical scoring for hybrid search.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::storage::{SearchFilters, VectorStore};

/// Rows fetched per query term before scores are folded together.
const CANDIDATES_PER_TERM: usize = 200;

/// Scores chunks by lexical match against the query.
#[async_trait]
pub trait KeywordScorer: Send + Sync {
    /// Best-matching chunk ids with scores in `[0, 1]`, descending.
    async fn score(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<(i64, f32)>>;
}

/// `LIKE`-based scorer over the store's chunk text.
///
/// Each distinct query term is matched case-insensitively as a substring;
/// a chunk's score is the fraction of terms it contains, so 1.0 means
/// every term matched.
#[derive(Debug, Clone)]
pub struct LikeKeywordScorer {
    store: VectorStore,
}

impl LikeKeywordScorer {
    pub fn new(store: VectorStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KeywordScorer for LikeKeywordScorer {
    async fn score(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<(i64, f32)>> {
        let mut terms: Vec<String> = query
            .split_whitespace()
            .map(|term| {
                term.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|term| term.chars().count() >= 2)
            .collect();
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: HashMap<i64, usize> = HashMap::new();
        for term in &terms {
            for chunk in self
                .store
                .search_text(term, filters, CANDIDATES_PER_TERM)
                .await?
            {
                *hits.entry(chunk.chunk_id).or_insert(0) += 1;
            }
        }
        debug!(terms = terms.len(), chunks = hits.len(), "keyword scoring done");

        let total = terms.len() as f32;
        let mut scores: Vec<(i64, f32)> = hits
            .into_iter()
            .map(|(chunk_id, matched)| (chunk_id, matched as f32 / total))
            .collect();
        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(limit);
        Ok(scores)
    }
}
