//! # folio-embed
//!
//! Embedding generation for the folio book index, built around a small
//! provider abstraction with an ordered fallback chain. Designed for async
//! operation with clean abstractions so local and remote backends are
//! interchangeable.
//!
//! ## Features
//!
//! - **Provider Chain**: Primary provider plus ordered fallbacks; a failure
//!   moves down the chain transparently
//! - **Deterministic Mock**: Hash-seeded offline provider for tests and
//!   air-gapped runs
//! - **Remote Backends**: OpenAI-compatible endpoints, Google Vertex AI,
//!   and local Ollama daemons
//! - **Shared Caching**: Vectors cached by `(text digest, model id)` so a
//!   model switch never serves stale embeddings
//! - **Async-First Design**: Full async/await support with tokio integration
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use folio_cache::TtlCache;
//! use folio_embed::{EmbeddingService, MockProvider};
//!
//! # async fn example() -> folio_embed::Result<()> {
//! let cache = Arc::new(TtlCache::new(1024, None));
//! let provider = Arc::new(MockProvider::with_dimension(384));
//! let service = EmbeddingService::new(vec![provider], cache)?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = service.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Per-provider configuration with fail-fast validation
//! - [`provider`]: The [`EmbeddingProvider`] trait and the mock provider
//! - [`remote`]: HTTP-backed providers (OpenAI, Vertex AI, Ollama)
//! - [`registry`]: Maps provider kinds to constructors
//! - [`service`]: Fallback chain, batching, and cache integration
//! - [`vector`]: Cosine similarity and ranking primitives
//! - [`error`]: Error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! Configuration problems fail at construction; at request time only
//! [`EmbedError::AllProvidersFailed`] escapes the chain, carrying every
//! (provider, error) attempt in order.

pub mod config;
pub mod error;
pub mod provider;
pub mod registry;
pub mod remote;
pub mod service;
pub mod vector;

// Re-export main types for easy access
pub use config::{MockConfig, OllamaConfig, OpenAiConfig, ProviderConfig, VertexConfig};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, MockProvider};
pub use registry::ProviderRegistry;
pub use remote::{OllamaProvider, OpenAiProvider, VertexProvider};
pub use service::{cache_key, EmbeddingService};
