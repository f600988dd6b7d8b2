//! Error types for indexing, storage, and search.

/// Convenient result alias for retriever operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An embedding whose length disagrees with the store's fixed dimension.
    /// Nothing is written when this is raised.
    #[error("embedding dimension mismatch: store holds {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The database was created by a newer version of this crate.
    #[error("unsupported schema version {found} (this build supports up to {supported})")]
    Schema { found: i64, supported: i64 },

    /// Chunk metadata or author lists that failed to round-trip as JSON.
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error for indexing and search operations.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// Rejected input, reported verbatim to the caller.
    #[error("{message}")]
    Validation { message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embed(#[from] folio_embed::EmbedError),

    #[error(transparent)]
    Segment(#[from] folio_segment::SegmentError),

    /// The library source could not produce a book's text or metadata.
    #[error("library error for book {book_id}: {message}")]
    Library { book_id: u64, message: String },

    /// Cooperative cancellation observed before or during a book's pipeline.
    #[error("indexing cancelled")]
    Cancelled,
}

impl RetrieverError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn library<S: Into<String>>(book_id: u64, message: S) -> Self {
        Self::Library {
            book_id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = RetrieverError::validation("Search query cannot be empty");
        assert_eq!(err.to_string(), "Search query cannot be empty");
    }

    #[test]
    fn test_dimension_error_display() {
        let err = StoreError::Dimension {
            expected: 384,
            actual: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_store_error_converts() {
        fn inner() -> Result<()> {
            Err(StoreError::Schema {
                found: 9,
                supported: 2,
            })?
        }
        assert!(matches!(
            inner(),
            Err(RetrieverError::Store(StoreError::Schema { found: 9, .. }))
        ));
    }
}
