//! Progress events and cooperative cancellation for indexing runs.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where a book currently is in the indexing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingStage {
    Starting,
    Chunking,
    GeneratingEmbeddings,
    Storing,
    Completed,
    Error,
}

impl IndexingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingStage::Starting => "starting",
            IndexingStage::Chunking => "chunking",
            IndexingStage::GeneratingEmbeddings => "generating-embeddings",
            IndexingStage::Storing => "storing",
            IndexingStage::Completed => "completed",
            IndexingStage::Error => "error",
        }
    }
}

impl fmt::Display for IndexingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification from the pipeline. Events for a single book arrive in
/// pipeline order; events of concurrently indexed books may interleave.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub book_id: u64,
    pub stage: IndexingStage,
    /// Coarse fraction of the per-book pipeline completed, in `[0, 1]`.
    pub progress: f32,
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub(crate) fn new(book_id: u64, stage: IndexingStage, progress: f32) -> Self {
        Self {
            book_id,
            stage,
            progress,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Callback invoked for every [`ProgressEvent`]. Observers run inline on the
/// indexing task, so they must be cheap and must not block.
pub type ProgressObserver = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Shared flag that stops an indexing run from starting new books. Books
/// already in flight finish normally.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(IndexingStage::GeneratingEmbeddings.to_string(), "generating-embeddings");
        assert_eq!(IndexingStage::Error.to_string(), "error");
    }
}
