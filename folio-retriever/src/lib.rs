//! folio-retriever: Semantic search and indexing for book collections
//!
//! This crate ties the folio workspace together: it segments book text into
//! chunks, embeds them through a provider fallback chain, persists chunks and
//! vectors in SQLite, and answers queries with several retrieval modes tuned
//! for long-form philosophical writing.
//!
//! ## Key Modules
//!
//! - **[`index`]**: Concurrent indexing orchestrator with progress events and
//!   cooperative cancellation
//! - **[`search`]**: Semantic, dialectical, genealogical, and hybrid search
//! - **[`storage`]**: SQLite-backed vector store with brute-force cosine
//!   ranking
//! - **[`library`]**: Book text and metadata sources
//! - **[`config`]**: `folio.toml` loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use folio_cache::CacheManager;
//! use folio_embed::{EmbeddingService, MockConfig, MockProvider};
//! use folio_retriever::index::{IndexingOrchestrator, OrchestratorConfig};
//! use folio_retriever::library::{BookMetadata, StaticLibrary};
//! use folio_retriever::search::{SearchEngine, SearchOptions};
//! use folio_retriever::storage::VectorStore;
//! use folio_segment::{SegmentStrategy, SegmenterConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = VectorStore::open_memory().await?;
//! let caches = Arc::new(CacheManager::with_defaults());
//! let embeddings = Arc::new(EmbeddingService::new(
//!     vec![Arc::new(MockProvider::new(MockConfig::default()))],
//!     caches.chunk_embeddings.clone(),
//! )?);
//! let library = Arc::new(StaticLibrary::new().with_book(
//!     1,
//!     BookMetadata::titled("Critique of Pure Reason"),
//!     "All our knowledge begins with experience.",
//! ));
//!
//! let orchestrator = IndexingOrchestrator::new(
//!     library.clone(),
//!     embeddings.clone(),
//!     store.clone(),
//!     SegmenterConfig::new(SegmentStrategy::Paragraph).build()?,
//!     OrchestratorConfig::default(),
//! );
//! orchestrator.index_all().await?;
//!
//! let engine = SearchEngine::new(store, embeddings, caches, library);
//! let results = engine
//!     .search("the limits of experience", &SearchOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Library → Segmenter → EmbeddingService → SQLite VectorStore
//!    ↑                        ↓                    ↓
//! folio.toml → IndexingOrchestrator ← CacheManager ← SearchEngine
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod library;
pub mod search;
pub mod storage;

pub use error::{Result, RetrieverError};
