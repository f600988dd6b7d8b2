//! Orchestrates the indexing pipeline: fetch text, segment, embed, store.
//!
//! One orchestrator drives a whole library. Books are processed with bounded
//! concurrency, each one walking the same pipeline and reporting progress
//! through registered observers. Per-book failures are recorded in the
//! [`IndexingReport`] and in the store's `index_status` table; they never
//! abort the surrounding batch.

use std::fmt;
use std::sync::Arc;

use folio_embed::EmbeddingService;
use folio_segment::Segmenter;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::progress::{CancelToken, IndexingStage, ProgressEvent, ProgressObserver};
use crate::error::{Result, RetrieverError};
use crate::library::Library;
use crate::storage::{IndexState, VectorStore};

/// Tunables for an indexing run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many books run through the pipeline at once.
    pub max_concurrent: usize,
    /// Re-process books that already have embeddings stored.
    pub reindex: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            reindex: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_reindex(mut self, reindex: bool) -> Self {
        self.reindex = reindex;
        self
    }
}

/// Summary of an [`IndexingOrchestrator::index_books`] run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexingReport {
    /// Books requested.
    pub total: usize,
    /// Books examined: indexed, failed, or skipped. Books never started
    /// because of cancellation are not counted here.
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_chunks: usize,
    /// Failure messages per book, in completion order.
    pub errors: Vec<(u64, String)>,
}

enum BookOutcome {
    Indexed(usize),
    Skipped,
    Failed(String),
    NotStarted,
}

/// Drives books from raw text to stored embeddings.
pub struct IndexingOrchestrator {
    library: Arc<dyn Library>,
    embeddings: Arc<EmbeddingService>,
    store: VectorStore,
    segmenter: Box<dyn Segmenter>,
    config: OrchestratorConfig,
    observers: Vec<ProgressObserver>,
    cancel: CancelToken,
}

impl fmt::Debug for IndexingOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexingOrchestrator")
            .field("config", &self.config)
            .field("model_id", &self.embeddings.model_id())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl IndexingOrchestrator {
    pub fn new(
        library: Arc<dyn Library>,
        embeddings: Arc<EmbeddingService>,
        store: VectorStore,
        segmenter: Box<dyn Segmenter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            library,
            embeddings,
            store,
            segmenter,
            config,
            observers: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Register a progress callback. Events for one book arrive in pipeline
    /// order; events of concurrent books interleave.
    pub fn add_progress_observer(&mut self, observer: ProgressObserver) {
        self.observers.push(observer);
    }

    /// Handle for stopping the run. Cancelling prevents new books from
    /// starting; books already in flight finish normally.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn emit(&self, event: ProgressEvent) {
        for observer in &self.observers {
            observer(event.clone());
        }
    }

    /// Run the full pipeline for one book, replacing any chunks it already
    /// has. The book's status moves `indexing` then `completed` or `failed`.
    pub async fn index_book(&self, book_id: u64) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(RetrieverError::Cancelled);
        }

        self.store
            .set_indexing_status(book_id, IndexState::Indexing, 0.0, None)
            .await?;
        self.emit(ProgressEvent::new(book_id, IndexingStage::Starting, 0.0));

        match self.run_pipeline(book_id).await {
            Ok(chunks) => {
                self.store
                    .set_indexing_status(book_id, IndexState::Completed, 1.0, None)
                    .await?;
                self.emit(
                    ProgressEvent::new(book_id, IndexingStage::Completed, 1.0)
                        .with_detail(format!("{chunks} chunks")),
                );
                info!(book_id, chunks, "book indexed");
                Ok(chunks)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(status_err) = self
                    .store
                    .set_indexing_status(book_id, IndexState::Failed, 0.0, Some(&message))
                    .await
                {
                    warn!(book_id, error = %status_err, "could not record failed status");
                }
                self.emit(
                    ProgressEvent::new(book_id, IndexingStage::Error, 0.0).with_detail(message),
                );
                error!(book_id, error = %e, "indexing failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, book_id: u64) -> Result<usize> {
        let text = self.library.book_text(book_id).await?;
        if text.trim().is_empty() {
            return Err(RetrieverError::validation(format!(
                "no extractable text in book {book_id}"
            )));
        }

        self.emit(ProgressEvent::new(book_id, IndexingStage::Chunking, 0.1));
        let chunks = self.segmenter.segment(book_id, &text);
        if chunks.is_empty() {
            return Err(RetrieverError::validation(format!(
                "segmentation produced no chunks for book {book_id}"
            )));
        }

        self.emit(
            ProgressEvent::new(book_id, IndexingStage::GeneratingEmbeddings, 0.3)
                .with_detail(format!("{} chunks", chunks.len())),
        );
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedded = self.embeddings.embed_texts(&texts).await?;

        self.emit(ProgressEvent::new(book_id, IndexingStage::Storing, 0.8));
        match self.library.book_metadata(book_id).await {
            Ok(meta) => {
                self.store
                    .upsert_book(book_id, &meta.title, &meta.authors)
                    .await?;
            }
            Err(e) => {
                // The placeholder row created by the chunk write stands in
                // until metadata becomes available.
                warn!(book_id, error = %e, "metadata unavailable, indexing without it");
            }
        }

        if self.store.has_embeddings(book_id).await? {
            debug!(book_id, "replacing existing chunks");
            self.store.clear_book_embeddings(book_id).await?;
        }
        let items: Vec<_> = chunks.into_iter().zip(embedded.embeddings).collect();
        let ids = self.store.store_chunks(book_id, &items).await?;
        self.store
            .record_model_id(&self.embeddings.model_id())
            .await?;
        Ok(ids.len())
    }

    /// Index many books with bounded concurrency, isolating per-book
    /// failures into the report.
    pub async fn index_books(&self, book_ids: &[u64]) -> IndexingReport {
        let mut report = IndexingReport {
            total: book_ids.len(),
            ..IndexingReport::default()
        };

        let outcomes: Vec<(u64, BookOutcome)> = stream::iter(book_ids.iter().copied())
            .map(move |book_id| self.index_one(book_id))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        for (book_id, outcome) in outcomes {
            match outcome {
                BookOutcome::Indexed(chunks) => {
                    report.processed += 1;
                    report.successful += 1;
                    report.total_chunks += chunks;
                }
                BookOutcome::Skipped => {
                    report.processed += 1;
                    report.skipped += 1;
                }
                BookOutcome::Failed(message) => {
                    report.processed += 1;
                    report.failed += 1;
                    report.errors.push((book_id, message));
                }
                BookOutcome::NotStarted => {}
            }
        }

        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            "indexing run finished"
        );
        report
    }

    /// Index every book the library lists.
    pub async fn index_all(&self) -> Result<IndexingReport> {
        let ids = self.library.book_ids().await?;
        Ok(self.index_books(&ids).await)
    }

    async fn index_one(&self, book_id: u64) -> (u64, BookOutcome) {
        if self.cancel.is_cancelled() {
            debug!(book_id, "cancelled before start");
            return (book_id, BookOutcome::NotStarted);
        }
        if !self.config.reindex {
            match self.store.has_embeddings(book_id).await {
                Ok(true) => {
                    debug!(book_id, "already indexed, skipping");
                    return (book_id, BookOutcome::Skipped);
                }
                Ok(false) => {}
                Err(e) => return (book_id, BookOutcome::Failed(e.to_string())),
            }
        }
        match self.index_book(book_id).await {
            Ok(chunks) => (book_id, BookOutcome::Indexed(chunks)),
            Err(RetrieverError::Cancelled) => (book_id, BookOutcome::NotStarted),
            Err(e) => (book_id, BookOutcome::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{BookMetadata, StaticLibrary};
    use anyhow::Result;
    use async_trait::async_trait;
    use folio_cache::TtlCache;
    use folio_embed::{EmbeddingProvider, MockConfig, MockProvider};
    use folio_segment::{ParagraphSegmenter, SegmentStrategy, SegmenterConfig};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    const HEGEL: &str = "Being, pure being, without further determination. \
        In its indeterminate immediacy it is equal only to itself.\n\n\
        Nothing, pure nothingness; it is simple equality with itself, \
        complete emptiness, complete absence of determination and content.\n\n\
        Becoming is the unseparatedness of being and nothing, the vanishing \
        of being into nothing and of nothing into being.";

    fn segmenter() -> Box<dyn Segmenter> {
        let config = SegmenterConfig::new(SegmentStrategy::Paragraph)
            .with_min_chunk_words(2)
            .with_max_chunk_words(60);
        Box::new(ParagraphSegmenter::new(config))
    }

    fn service() -> Arc<EmbeddingService> {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(MockProvider::new(MockConfig { dimension: 8 }));
        let cache = Arc::new(TtlCache::new(256, None));
        Arc::new(EmbeddingService::new(vec![provider], cache).unwrap())
    }

    fn orchestrator(
        library: impl Library + 'static,
        store: VectorStore,
        config: OrchestratorConfig,
    ) -> IndexingOrchestrator {
        IndexingOrchestrator::new(Arc::new(library), service(), store, segmenter(), config)
    }

    fn three_books() -> StaticLibrary {
        StaticLibrary::new()
            .with_book(1, BookMetadata::titled("Science of Logic"), HEGEL)
            .with_book(2, BookMetadata::titled("Phenomenology of Spirit"), HEGEL)
            .with_book(3, BookMetadata::titled("Philosophy of Right"), HEGEL)
    }

    #[traced_test]
    #[tokio::test]
    async fn test_index_book_happy_path() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library = StaticLibrary::new().with_book(
            7,
            BookMetadata::titled("Science of Logic").with_authors(vec!["Hegel".to_string()]),
            HEGEL,
        );
        let orch = orchestrator(library, store.clone(), OrchestratorConfig::default());

        let chunks = orch.index_book(7).await?;
        assert!(chunks > 0);

        let status = store.get_indexing_status(7).await?.unwrap();
        assert_eq!(status.state, IndexState::Completed);
        assert!((status.progress - 1.0).abs() < 1e-6);

        let book = store.get_book(7).await?.unwrap();
        assert!(!book.placeholder);
        assert_eq!(book.title, "Science of Logic");

        let stats = store.stats().await?;
        assert_eq!(stats.chunks as usize, chunks);
        assert_eq!(stats.embedding_dimension, Some(8));
        assert_eq!(stats.model_id.as_deref(), Some("mock:deterministic:1:8:norm"));
        Ok(())
    }

    #[tokio::test]
    async fn test_index_book_without_text_fails() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library =
            StaticLibrary::new().with_book(1, BookMetadata::titled("Empty"), "   \n\t  ");
        let orch = orchestrator(library, store.clone(), OrchestratorConfig::default());

        let err = orch.index_book(1).await.unwrap_err();
        assert!(err.to_string().contains("no extractable text"));

        let status = store.get_indexing_status(1).await?.unwrap();
        assert_eq!(status.state, IndexState::Failed);
        assert!(status.error.unwrap().contains("no extractable text"));
        Ok(())
    }

    #[tokio::test]
    async fn test_index_books_skips_already_indexed() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let orch = orchestrator(three_books(), store.clone(), OrchestratorConfig::default());

        orch.index_book(2).await?;
        let report = orch.index_books(&[1, 2, 3]).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);
        assert!(store.has_embeddings(1).await?);
        assert!(store.has_embeddings(3).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_index_books_isolates_failures() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library = StaticLibrary::new()
            .with_book(1, BookMetadata::titled("Good"), HEGEL)
            .with_book(2, BookMetadata::titled("Blank"), "")
            .with_book(3, BookMetadata::titled("Also Good"), HEGEL);
        let orch = orchestrator(library, store.clone(), OrchestratorConfig::default());

        let report = orch.index_books(&[1, 2, 3]).await;
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 2);
        assert!(report.errors[0].1.contains("no extractable text"));
        Ok(())
    }

    #[tokio::test]
    async fn test_reindex_replaces_instead_of_duplicating() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library = StaticLibrary::new().with_book(1, BookMetadata::titled("Logic"), HEGEL);
        let orch = orchestrator(library, store.clone(), OrchestratorConfig::default());

        let first = orch.index_book(1).await?;
        let second = orch.index_book(1).await?;
        assert_eq!(first, second);
        assert_eq!(store.stats().await?.chunks as usize, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_before_start_leaves_store_untouched() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let orch = orchestrator(three_books(), store.clone(), OrchestratorConfig::default());

        orch.cancel_token().cancel();
        let err = orch.index_book(1).await.unwrap_err();
        assert!(matches!(err, RetrieverError::Cancelled));
        assert!(store.get_indexing_status(1).await?.is_none());
        assert_eq!(store.stats().await?.chunks, 0);

        let report = orch.index_books(&[1, 2, 3]).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.processed, 0);
        assert_eq!(report.successful, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_progress_events_arrive_in_pipeline_order() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library = StaticLibrary::new().with_book(1, BookMetadata::titled("Logic"), HEGEL);
        let mut orch = orchestrator(library, store, OrchestratorConfig::default());

        let seen: Arc<Mutex<Vec<IndexingStage>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        orch.add_progress_observer(Arc::new(move |event| {
            sink.lock().unwrap().push(event.stage);
        }));

        orch.index_book(1).await?;
        let stages = seen.lock().unwrap().clone();
        assert_eq!(
            stages,
            vec![
                IndexingStage::Starting,
                IndexingStage::Chunking,
                IndexingStage::GeneratingEmbeddings,
                IndexingStage::Storing,
                IndexingStage::Completed,
            ]
        );
        Ok(())
    }

    struct OfflineCatalog(StaticLibrary);

    #[async_trait]
    impl Library for OfflineCatalog {
        async fn book_metadata(&self, book_id: u64) -> crate::error::Result<BookMetadata> {
            Err(RetrieverError::library(book_id, "catalog offline"))
        }

        async fn book_text(&self, book_id: u64) -> crate::error::Result<String> {
            self.0.book_text(book_id).await
        }

        async fn book_ids(&self) -> crate::error::Result<Vec<u64>> {
            self.0.book_ids().await
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_abort_indexing() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let library =
            OfflineCatalog(StaticLibrary::new().with_book(1, BookMetadata::titled("x"), HEGEL));
        let orch = orchestrator(library, store.clone(), OrchestratorConfig::default());

        let chunks = orch.index_book(1).await?;
        assert!(chunks > 0);

        // Book row stays a placeholder until metadata shows up.
        let book = store.get_book(1).await?.unwrap();
        assert!(book.placeholder);
        assert_eq!(book.title, "(unknown)");
        Ok(())
    }

    #[tokio::test]
    async fn test_index_all_uses_library_listing() -> Result<()> {
        let store = VectorStore::open_memory().await?;
        let orch = orchestrator(three_books(), store, OrchestratorConfig::default());

        let report = orch.index_all().await?;
        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 3);
        assert!(report.total_chunks >= 3);
        Ok(())
    }
}
