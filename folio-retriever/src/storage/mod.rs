//! Persistent storage for chunks, embeddings, and indexing state.
//!
//! This module provides the SQLite-backed data layer for folio-retriever:
//! book rows, text chunks with their embedding vectors, per-book indexing
//! status, and a small key/value table pinning the store's embedding
//! dimension and model.
//!
//! ## Database Schema (version 2)
//!
//! ```sql
//! CREATE TABLE books (
//!     book_id INTEGER PRIMARY KEY,
//!     title TEXT NOT NULL,
//!     authors TEXT NOT NULL DEFAULT '[]',   -- JSON array
//!     placeholder INTEGER NOT NULL DEFAULT 0,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE chunks (
//!     chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     book_id INTEGER NOT NULL REFERENCES books(book_id) ON DELETE CASCADE,
//!     chunk_index INTEGER NOT NULL,
//!     start_pos INTEGER NOT NULL,            -- byte offset into the book
//!     end_pos INTEGER NOT NULL,
//!     text TEXT NOT NULL,
//!     metadata TEXT,                         -- JSON object (added in v2)
//!     embedding BLOB NOT NULL,               -- little-endian f32 vector
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE index_status (
//!     book_id INTEGER PRIMARY KEY,
//!     state TEXT NOT NULL,                   -- pending|indexing|completed|failed
//!     progress REAL NOT NULL DEFAULT 0,
//!     error TEXT,
//!     updated_at TEXT NOT NULL               -- RFC 3339
//! );
//!
//! CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! The schema version lives in `PRAGMA user_version`; older databases are
//! migrated in place on open.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod vector_store;

pub use vector_store::VectorStore;

/// Database ID for a stored chunk.
pub type ChunkId = i64;

/// A chunk row as stored, metadata decoded from its JSON column.
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    pub chunk_id: ChunkId,
    pub book_id: u64,
    pub chunk_index: u32,
    pub start_pos: usize,
    pub end_pos: usize,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One similarity hit from the store.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarChunk {
    pub chunk: StoredChunk,
    pub similarity: f32,
}

/// Book row as stored; `placeholder` marks rows auto-created by an
/// out-of-order embedding write before real metadata arrived.
#[derive(Debug, Clone, Serialize)]
pub struct BookRow {
    pub book_id: u64,
    pub title: String,
    pub authors: Vec<String>,
    pub placeholder: bool,
}

/// Restricts similarity and keyword candidates to a set of books.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub book_ids: Option<Vec<u64>>,
}

impl SearchFilters {
    pub fn for_books(book_ids: Vec<u64>) -> Self {
        Self {
            book_ids: Some(book_ids),
        }
    }
}

/// Lifecycle state of a book's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// Queued but not yet picked up.
    Pending,
    /// A pipeline is currently working on the book.
    Indexing,
    /// All chunks stored with embeddings.
    Completed,
    /// The last attempt errored; see the status row's `error`.
    Failed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Pending => "pending",
            IndexState::Indexing => "indexing",
            IndexState::Completed => "completed",
            IndexState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(IndexState::Pending),
            "indexing" => Ok(IndexState::Indexing),
            "completed" => Ok(IndexState::Completed),
            "failed" => Ok(IndexState::Failed),
            _ => Err(format!("Invalid index state: {s}")),
        }
    }
}

/// Current indexing status row for a book.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub book_id: u64,
    pub state: IndexState,
    /// Fraction of the pipeline completed, in `[0, 1]`.
    pub progress: f32,
    /// Populated only when `state` is [`IndexState::Failed`].
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts for the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub books: u64,
    pub chunks: u64,
    /// Fixed once the first embedding lands.
    pub embedding_dimension: Option<usize>,
    pub model_id: Option<String>,
}
