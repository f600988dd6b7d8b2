//! Search over indexed books.
//!
//! [`SearchEngine`] answers queries in four modes. `Semantic` is plain
//! cosine ranking; `Dialectical` widens the net with opposing concepts;
//! `Genealogical` reorders results chronologically; `Hybrid` blends cosine
//! similarity with lexical keyword scores.

pub mod engine;
pub mod keyword;
pub mod opposites;

pub use engine::SearchEngine;
pub use keyword::{KeywordScorer, LikeKeywordScorer};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::storage::SearchFilters;

/// How query results are ranked and decorated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Dialectical,
    Genealogical,
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Semantic => write!(f, "semantic"),
            SearchMode::Dialectical => write!(f, "dialectical"),
            SearchMode::Genealogical => write!(f, "genealogical"),
            SearchMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(SearchMode::Semantic),
            "dialectical" => Ok(SearchMode::Dialectical),
            "genealogical" | "chronological" => Ok(SearchMode::Genealogical),
            "hybrid" => Ok(SearchMode::Hybrid),
            _ => Err(format!(
                "Invalid mode: '{s}'. Valid values are: semantic, dialectical, genealogical, hybrid"
            )),
        }
    }
}

/// Knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    /// Maximum results returned.
    pub limit: usize,
    /// Results below this cosine similarity are dropped.
    pub similarity_threshold: f32,
    pub filters: SearchFilters,
    /// When false, mode annotations are stripped from the results.
    pub annotate: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Semantic,
            limit: 10,
            similarity_threshold: 0.0,
            filters: SearchFilters::default(),
            annotate: true,
        }
    }
}

impl SearchOptions {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// One search hit, enriched with book identity and mode annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub book_id: u64,
    pub chunk_index: u32,
    pub text: String,
    /// Ranking score. Cosine similarity in most modes; the blended score
    /// in `Hybrid`.
    pub similarity: f32,
    pub title: String,
    pub authors: Vec<String>,
    /// Mode-specific decorations such as `dialectical`, `opposition_to`,
    /// `chronological_rank`, `year`.
    #[serde(default)]
    pub annotations: HashMap<String, serde_json::Value>,
}
