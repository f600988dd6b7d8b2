//! Query execution across the four search modes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use folio_cache::CacheManager;
use folio_embed::EmbeddingService;
use serde_json::json;
use tracing::{debug, info, warn};

use super::keyword::KeywordScorer;
use super::opposites::opposing_concepts;
use super::{SearchMode, SearchOptions, SearchResult};
use crate::error::{Result, RetrieverError};
use crate::library::{BookMetadata, Library, year_in_title};
use crate::storage::{SearchFilters, SimilarChunk, VectorStore};

const MAX_QUERY_CHARS: usize = 5000;
const MIN_QUERY_CHARS: usize = 3;
/// Opposing concepts consulted per dialectical query.
const MAX_OPPOSITES: usize = 3;
const SEMANTIC_WEIGHT: f32 = 0.7;
const KEYWORD_WEIGHT: f32 = 0.3;

/// Answers queries against a populated [`VectorStore`].
pub struct SearchEngine {
    store: VectorStore,
    embeddings: Arc<EmbeddingService>,
    caches: Arc<CacheManager>,
    library: Arc<dyn Library>,
    keyword: Option<Arc<dyn KeywordScorer>>,
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("model_id", &self.embeddings.model_id())
            .field("keyword_scorer", &self.keyword.is_some())
            .finish()
    }
}

impl SearchEngine {
    pub fn new(
        store: VectorStore,
        embeddings: Arc<EmbeddingService>,
        caches: Arc<CacheManager>,
        library: Arc<dyn Library>,
    ) -> Self {
        Self {
            store,
            embeddings,
            caches,
            library,
            keyword: None,
        }
    }

    /// Attach a lexical scorer for `Hybrid` mode. Without one, hybrid
    /// results carry semantic scores scaled by the semantic weight.
    pub fn with_keyword_scorer(mut self, scorer: Arc<dyn KeywordScorer>) -> Self {
        self.keyword = Some(scorer);
        self
    }

    /// Run one query. Results come from the result cache when an identical
    /// query was answered recently.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        validate_query(query)?;

        let cache_key = results_cache_key(query, options);
        if let Some(value) = self.caches.results.get(&cache_key) {
            if let Ok(results) = serde_json::from_value::<Vec<SearchResult>>(value) {
                debug!(mode = %options.mode, "search served from result cache");
                return Ok(results);
            }
        }

        let mut results = match options.mode {
            SearchMode::Semantic => self.semantic(query, options).await?,
            SearchMode::Dialectical => self.dialectical(query, options).await?,
            SearchMode::Genealogical => self.genealogical(query, options).await?,
            SearchMode::Hybrid => self.hybrid(query, options).await?,
        };
        if !options.annotate {
            for result in &mut results {
                result.annotations.clear();
            }
        }

        if let Ok(value) = serde_json::to_value(&results) {
            self.caches.results.insert(cache_key, value);
        }
        info!(mode = %options.mode, results = results.len(), "search complete");
        Ok(results)
    }

    /// Chunks most similar to an already-stored chunk, excluding itself.
    pub async fn find_similar(&self, chunk_id: i64, limit: usize) -> Result<Vec<SearchResult>> {
        let Some(embedding) = self.store.get_embedding(chunk_id).await? else {
            return Err(RetrieverError::validation(format!(
                "chunk not found: {chunk_id}"
            )));
        };

        let hits = self
            .store
            .search_similar(&embedding, limit + 1, &SearchFilters::default())
            .await?;
        let mut results = Vec::new();
        for hit in hits {
            if hit.chunk.chunk_id == chunk_id {
                continue;
            }
            results.push(self.enrich(hit).await?);
            if results.len() == limit {
                break;
            }
        }
        Ok(results)
    }

    async fn semantic(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let embedding = self.query_embedding(query).await?;
        let hits = self
            .store
            .search_similar(&embedding, options.limit * 2, &options.filters)
            .await?;

        let mut results = Vec::new();
        for hit in hits {
            if hit.similarity < options.similarity_threshold {
                continue;
            }
            results.push(self.enrich(hit).await?);
            if results.len() == options.limit {
                break;
            }
        }
        Ok(results)
    }

    /// Base semantic results widened with searches for opposing concepts.
    async fn dialectical(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let base = self.semantic(query, options).await?;
        let opposites = opposing_concepts(query, MAX_OPPOSITES);
        if opposites.is_empty() {
            debug!("no opposing concepts matched, returning semantic results");
            return Ok(base);
        }

        let mut merged: HashMap<i64, SearchResult> =
            base.into_iter().map(|r| (r.chunk_id, r)).collect();
        for (term, opposite) in opposites {
            debug!(term, opposite, "searching opposing concept");
            for mut result in self.semantic(&opposite, options).await? {
                result
                    .annotations
                    .insert("dialectical".to_string(), json!(true));
                result
                    .annotations
                    .insert("opposition_to".to_string(), json!(term.clone()));
                match merged.get_mut(&result.chunk_id) {
                    Some(existing) if existing.similarity >= result.similarity => {}
                    _ => {
                        merged.insert(result.chunk_id, result);
                    }
                }
            }
        }

        let mut results: Vec<SearchResult> = merged.into_values().collect();
        sort_by_score(&mut results);
        results.truncate(options.limit);
        Ok(results)
    }

    /// Semantic results reordered by publication year, oldest first.
    async fn genealogical(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let results = self.semantic(query, options).await?;

        let mut dated = Vec::with_capacity(results.len());
        for result in results {
            let year = self.result_year(&result).await;
            dated.push((year, result));
        }
        // Stable sort keeps the similarity order among unknown years.
        dated.sort_by_key(|(year, _)| match year {
            Some(y) => (0, *y),
            None => (1, 0),
        });

        let mut out = Vec::with_capacity(dated.len());
        for (rank, (year, mut result)) in dated.into_iter().enumerate() {
            result
                .annotations
                .insert("chronological_rank".to_string(), json!(rank + 1));
            if let Some(year) = year {
                result.annotations.insert("year".to_string(), json!(year));
            }
            out.push(result);
        }
        Ok(out)
    }

    /// Blend of cosine similarity and keyword score. A chunk missing from
    /// one side contributes zero for that side.
    async fn hybrid(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let semantic = self.semantic(query, options).await?;

        let Some(scorer) = &self.keyword else {
            let mut results = semantic;
            for result in &mut results {
                result.similarity *= SEMANTIC_WEIGHT;
            }
            return Ok(results);
        };

        let mut keyword_scores: HashMap<i64, f32> = scorer
            .score(query, &options.filters, options.limit * 2)
            .await?
            .into_iter()
            .collect();

        let mut combined = Vec::new();
        for mut result in semantic {
            let keyword = keyword_scores.remove(&result.chunk_id).unwrap_or(0.0);
            let semantic_score = result.similarity;
            result.similarity = SEMANTIC_WEIGHT * semantic_score + KEYWORD_WEIGHT * keyword;
            result
                .annotations
                .insert("semantic_score".to_string(), json!(semantic_score));
            result
                .annotations
                .insert("keyword_score".to_string(), json!(keyword));
            combined.push(result);
        }
        // Chunks only the keyword side found.
        for (chunk_id, keyword) in keyword_scores {
            if let Some(chunk) = self.store.get_chunk(chunk_id).await? {
                let mut result = self
                    .enrich(SimilarChunk {
                        chunk,
                        similarity: 0.0,
                    })
                    .await?;
                result.similarity = KEYWORD_WEIGHT * keyword;
                result
                    .annotations
                    .insert("semantic_score".to_string(), json!(0.0));
                result
                    .annotations
                    .insert("keyword_score".to_string(), json!(keyword));
                combined.push(result);
            }
        }

        sort_by_score(&mut combined);
        combined.truncate(options.limit);
        Ok(combined)
    }

    /// Query embedding, served from the query cache when possible.
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        let key = folio_embed::cache_key(query, &self.embeddings.model_id());
        if let Some(hit) = self.caches.query_embeddings.get(&key) {
            debug!("query embedding served from cache");
            return Ok(hit);
        }
        let embedding = self.embeddings.embed_text(query).await?;
        self.caches
            .query_embeddings
            .insert(key, embedding.clone());
        Ok(embedding)
    }

    /// Attach book title and authors to a hit. The chunk's stored tags seed
    /// the annotations so segmenter markers surface in results.
    async fn enrich(&self, hit: SimilarChunk) -> Result<SearchResult> {
        let book_id = hit.chunk.book_id;
        let (title, authors) = match self.book_metadata_cached(book_id).await {
            Some(meta) if !meta.title.is_empty() => (meta.title, meta.authors),
            _ => match self.store.get_book(book_id).await? {
                Some(row) => (row.title, row.authors),
                None => ("(unknown)".to_string(), Vec::new()),
            },
        };

        Ok(SearchResult {
            chunk_id: hit.chunk.chunk_id,
            book_id,
            chunk_index: hit.chunk.chunk_index,
            text: hit.chunk.text,
            similarity: hit.similarity,
            title,
            authors,
            annotations: hit.chunk.metadata,
        })
    }

    async fn book_metadata_cached(&self, book_id: u64) -> Option<BookMetadata> {
        if let Some(value) = self.caches.metadata.get(&book_id) {
            if let Ok(meta) = serde_json::from_value(value) {
                return Some(meta);
            }
        }
        match self.library.book_metadata(book_id).await {
            Ok(meta) => {
                if let Ok(value) = serde_json::to_value(&meta) {
                    self.caches.metadata.insert(book_id, value);
                }
                Some(meta)
            }
            Err(e) => {
                warn!(book_id, error = %e, "book metadata unavailable, using stored row");
                None
            }
        }
    }

    async fn result_year(&self, result: &SearchResult) -> Option<i32> {
        match self.book_metadata_cached(result.book_id).await {
            Some(meta) => meta.year().or_else(|| year_in_title(&result.title)),
            None => year_in_title(&result.title),
        }
    }
}

fn validate_query(query: &str) -> Result<()> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(RetrieverError::validation("Search query cannot be empty"));
    }
    let chars = trimmed.chars().count();
    if chars < MIN_QUERY_CHARS {
        return Err(RetrieverError::validation(
            "Search query must be at least 3 characters",
        ));
    }
    if chars > MAX_QUERY_CHARS {
        return Err(RetrieverError::validation(
            "Search query must be at most 5000 characters",
        ));
    }
    Ok(())
}

fn results_cache_key(query: &str, options: &SearchOptions) -> String {
    let books = match &options.filters.book_ids {
        Some(ids) => format!("{ids:?}"),
        None => "all".to_string(),
    };
    let payload = format!(
        "{}:{}:{}:{}:{}:{}",
        options.mode, options.limit, options.similarity_threshold, books, options.annotate, query
    );
    blake3::hash(payload.as_bytes()).to_hex().to_string()
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::StaticLibrary;
    use crate::search::LikeKeywordScorer;
    use anyhow::Result;
    use chrono::NaiveDate;
    use folio_embed::{EmbeddingProvider, MockConfig, MockProvider};
    use folio_segment::Chunk;

    const TEXTS: [(u64, &str); 3] = [
        (1, "the dialectic of being and nothing"),
        (2, "anxiety reveals the nothing itself"),
        (3, "freedom of the will against causal necessity"),
    ];

    async fn engine() -> Result<(SearchEngine, VectorStore)> {
        let store = VectorStore::open_memory().await?;
        let caches = Arc::new(CacheManager::with_defaults());
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(MockProvider::new(MockConfig { dimension: 16 }));
        let service = Arc::new(EmbeddingService::new(
            vec![provider],
            caches.chunk_embeddings.clone(),
        )?);

        let library = StaticLibrary::new()
            .with_book(
                1,
                BookMetadata::titled("Science of Logic")
                    .with_authors(vec!["Hegel".to_string()])
                    .with_pubdate(NaiveDate::from_ymd_opt(1812, 1, 1).unwrap()),
                "",
            )
            .with_book(2, BookMetadata::titled("Being and Time (1927)"), "")
            .with_book(3, BookMetadata::titled("Untitled Fragments"), "");

        for (i, (book_id, text)) in TEXTS.iter().enumerate() {
            let embedding = service.embed_text(text).await?;
            store
                .store_embedding(
                    *book_id,
                    &Chunk::new(*book_id, i as u32, *text, 0, text.len()),
                    &embedding,
                )
                .await?;
        }

        let engine = SearchEngine::new(store.clone(), service, caches, Arc::new(library));
        Ok((engine, store))
    }

    #[tokio::test]
    async fn test_validation_messages_are_exact() -> Result<()> {
        let (engine, _) = engine().await?;
        let options = SearchOptions::default();

        let err = engine.search("", &options).await.unwrap_err();
        assert_eq!(err.to_string(), "Search query cannot be empty");
        let err = engine.search("   \n", &options).await.unwrap_err();
        assert_eq!(err.to_string(), "Search query cannot be empty");

        let err = engine.search("ab", &options).await.unwrap_err();
        assert_eq!(err.to_string(), "Search query must be at least 3 characters");

        let long = "x".repeat(5001);
        let err = engine.search(&long, &options).await.unwrap_err();
        assert_eq!(err.to_string(), "Search query must be at most 5000 characters");
        Ok(())
    }

    #[tokio::test]
    async fn test_semantic_ranks_exact_match_first() -> Result<()> {
        let (engine, _) = engine().await?;
        let results = engine
            .search("anxiety reveals the nothing itself", &SearchOptions::default())
            .await?;

        assert_eq!(results[0].book_id, 2);
        assert!(results[0].similarity > 0.999);
        assert_eq!(results[0].title, "Being and Time (1927)");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_and_filters() -> Result<()> {
        let (engine, _) = engine().await?;

        let strict = SearchOptions::default().with_threshold(0.99);
        let results = engine
            .search("anxiety reveals the nothing itself", &strict)
            .await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].book_id, 2);

        let filtered = SearchOptions::default().with_filters(SearchFilters::for_books(vec![1, 3]));
        let results = engine
            .search("anxiety reveals the nothing itself", &filtered)
            .await?;
        assert!(results.iter().all(|r| r.book_id != 2));
        Ok(())
    }

    #[tokio::test]
    async fn test_dialectical_tags_opposing_results() -> Result<()> {
        let (engine, store) = engine().await?;
        // A chunk that matches the opposing concept of "freedom" exactly.
        let embedding = engine.embeddings.embed_text("determinism").await?;
        store
            .store_embedding(3, &Chunk::new(3, 9, "determinism", 0, 11), &embedding)
            .await?;

        let results = engine
            .search(
                "freedom of the will",
                &SearchOptions::new(SearchMode::Dialectical),
            )
            .await?;

        let tagged = results
            .iter()
            .find(|r| r.text == "determinism")
            .expect("opposing chunk present");
        assert_eq!(tagged.annotations["dialectical"], json!(true));
        assert_eq!(tagged.annotations["opposition_to"], json!("freedom"));
        Ok(())
    }

    #[tokio::test]
    async fn test_dialectical_without_lexicon_match_is_semantic() -> Result<()> {
        let (engine, _) = engine().await?;
        let results = engine
            .search(
                "quantum electrodynamics lectures",
                &SearchOptions::new(SearchMode::Dialectical),
            )
            .await?;
        assert!(results.iter().all(|r| !r.annotations.contains_key("dialectical")));
        Ok(())
    }

    #[tokio::test]
    async fn test_genealogical_orders_oldest_first_unknown_last() -> Result<()> {
        let (engine, _) = engine().await?;
        // Disable the similarity floor so every book participates no matter
        // how the deterministic vectors happen to correlate.
        let results = engine
            .search(
                "being and nothing",
                &SearchOptions::new(SearchMode::Genealogical).with_threshold(-1.0),
            )
            .await?;

        assert_eq!(results.len(), 3);
        // 1812 from pubdate, 1927 from the title pattern, unknown last.
        assert_eq!(results[0].book_id, 1);
        assert_eq!(results[1].book_id, 2);
        assert_eq!(results[2].book_id, 3);
        assert_eq!(results[0].annotations["year"], json!(1812));
        assert_eq!(results[1].annotations["year"], json!(1927));
        assert!(!results[2].annotations.contains_key("year"));
        assert_eq!(results[0].annotations["chronological_rank"], json!(1));
        assert_eq!(results[2].annotations["chronological_rank"], json!(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_hybrid_blends_semantic_and_keyword() -> Result<()> {
        let (engine, store) = engine().await?;
        let engine = engine.with_keyword_scorer(Arc::new(LikeKeywordScorer::new(store)));

        let results = engine
            .search(
                "anxiety reveals the nothing itself",
                &SearchOptions::new(SearchMode::Hybrid),
            )
            .await?;

        // Exact match on both sides: 0.7 * 1.0 + 0.3 * 1.0.
        assert_eq!(results[0].book_id, 2);
        assert!(results[0].similarity > 0.95);
        assert!(results[0].annotations.contains_key("semantic_score"));
        assert!(results[0].annotations.contains_key("keyword_score"));
        Ok(())
    }

    #[tokio::test]
    async fn test_hybrid_without_scorer_scales_semantic() -> Result<()> {
        let (engine, _) = engine().await?;
        let results = engine
            .search(
                "anxiety reveals the nothing itself",
                &SearchOptions::new(SearchMode::Hybrid),
            )
            .await?;
        assert_eq!(results[0].book_id, 2);
        assert!((results[0].similarity - SEMANTIC_WEIGHT).abs() < 0.01);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_similar_excludes_source_chunk() -> Result<()> {
        let (engine, _) = engine().await?;
        let results = engine.find_similar(1, 5).await?;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.chunk_id != 1));

        let err = engine.find_similar(999, 5).await.unwrap_err();
        assert_eq!(err.to_string(), "chunk not found: 999");
        Ok(())
    }

    #[tokio::test]
    async fn test_results_are_cached() -> Result<()> {
        let (engine, store) = engine().await?;
        let options = SearchOptions::default();
        let query = "the dialectic of being and nothing";
        let first = engine.search(query, &options).await?;
        assert!(!first.is_empty());

        // Empty the store; the cached result list must still be served.
        for book_id in [1, 2, 3] {
            store.clear_book_embeddings(book_id).await?;
        }
        let second = engine.search(query, &options).await?;
        assert_eq!(second.len(), first.len());
        assert_eq!(second[0].chunk_id, first[0].chunk_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_annotations_can_be_stripped() -> Result<()> {
        let (engine, _) = engine().await?;
        let mut options = SearchOptions::new(SearchMode::Genealogical).with_threshold(-1.0);
        options.annotate = false;
        let results = engine.search("being and nothing", &options).await?;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.annotations.is_empty()));
        Ok(())
    }
}
