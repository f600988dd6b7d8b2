//! Embedding provider trait and the deterministic mock implementation.

use async_trait::async_trait;

use crate::config::MockConfig;
use crate::error::Result;
use crate::vector;

/// Default number of texts a provider accepts per upstream request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;

/// Default maximum input length in characters before truncation.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 8192;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new result; the dimension is inferred from the first vector
    /// and defaults to 0 when the batch is empty.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Stable identifier of the model behind this provider, in the form
    /// `provider:model:version:dimension:norm-flag`. Cache keys and stored
    /// index metadata embed it, so it must change whenever the vectors a
    /// provider produces would change.
    fn model_id(&self) -> String;

    /// Largest batch a single upstream request may carry.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }

    /// Inputs longer than this are truncated before embedding.
    fn max_text_length(&self) -> usize {
        DEFAULT_MAX_TEXT_LENGTH
    }
}

impl std::fmt::Debug for dyn EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("name", &self.provider_name())
            .field("dimension", &self.embedding_dimension())
            .finish()
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub(crate) fn truncate_text<'a>(text: &'a str, max_chars: usize, provider: &str) -> &'a str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::debug!(
                provider,
                original_chars = text.chars().count(),
                max_chars,
                "truncating oversized input text"
            );
            &text[..byte_idx]
        }
        None => text,
    }
}

/// Deterministic embedding provider that needs no network or model files.
///
/// Each text is hashed with BLAKE3 and the hash seeds a xorshift64* stream,
/// so equal texts always produce identical, unit-length vectors. Useful for
/// tests and for running the full indexing pipeline offline.
#[derive(Debug, Clone)]
pub struct MockProvider {
    dimension: usize,
}

impl MockProvider {
    pub fn new(config: MockConfig) -> Self {
        Self {
            dimension: config.dimension,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let hash = blake3::hash(text.as_bytes());
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&hash.as_bytes()[..8]);
        let seed = u64::from_le_bytes(seed_bytes);
        // xorshift64* keeps the stream well distributed even for seeds that
        // differ in only a few bits.
        let mut state = seed | 1;
        let mut embedding = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let value = state.wrapping_mul(0x2545F4914F6CDD1D);
            // Map the top 24 bits onto [-1, 1].
            let unit = (value >> 40) as f32 / (1u64 << 23) as f32;
            embedding.push(unit - 1.0);
        }
        vector::normalize(&mut embedding);
        embedding
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_text(text, self.max_text_length(), self.provider_name());
        Ok(self.generate(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts
            .iter()
            .map(|text| {
                let text = truncate_text(text, self.max_text_length(), self.provider_name());
                self.generate(text)
            })
            .collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> String {
        format!("mock:deterministic:1:{}:norm", self.dimension)
    }
}
