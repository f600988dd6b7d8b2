//! Fallback-chain embedding service with a shared cache.
//!
//! The service owns an ordered chain of providers (primary first). Every
//! lookup and write goes through the shared [`TtlCache`], keyed by
//! `blake3(text):model_id` so vectors from different models never collide.
//! A provider failure advances the chain; only when every provider has
//! failed does the caller see an error, carrying each attempt in order.

use std::sync::{Arc, Mutex, MutexGuard};

use folio_cache::TtlCache;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use crate::registry::ProviderRegistry;

/// Cache key for one text under one model.
pub fn cache_key(text: &str, model_id: &str) -> String {
    format!("{}:{}", blake3::hash(text.as_bytes()).to_hex(), model_id)
}

pub struct EmbeddingService {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    cache: Arc<TtlCache<String, Vec<f32>>>,
    last_served: Mutex<Option<String>>,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("providers", &self.provider_names())
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl EmbeddingService {
    /// Build a service over an ordered provider chain.
    ///
    /// The chain must be non-empty and dimensionally uniform; a fallback
    /// producing vectors of a different length than the primary would make
    /// stored embeddings incomparable, so it is rejected here.
    pub fn new(
        providers: Vec<Arc<dyn EmbeddingProvider>>,
        cache: Arc<TtlCache<String, Vec<f32>>>,
    ) -> Result<Self> {
        let Some(primary) = providers.first() else {
            return Err(EmbedError::invalid_config("provider chain cannot be empty"));
        };
        let dimension = primary.embedding_dimension();
        for provider in &providers[1..] {
            if provider.embedding_dimension() != dimension {
                return Err(EmbedError::invalid_config(format!(
                    "fallback provider '{}' produces dimension {}, primary produces {}",
                    provider.provider_name(),
                    provider.embedding_dimension(),
                    dimension
                )));
            }
        }
        Ok(Self {
            providers,
            cache,
            last_served: Mutex::new(None),
        })
    }

    /// Build the chain from configs via a registry, then wrap it.
    pub fn from_configs(
        registry: &ProviderRegistry,
        configs: &[ProviderConfig],
        cache: Arc<TtlCache<String, Vec<f32>>>,
    ) -> Result<Self> {
        Self::new(registry.build_chain(configs)?, cache)
    }

    /// Embed one text, serving from cache when possible.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            let name = provider.provider_name();
            let key = cache_key(text, &provider.model_id());
            if let Some(hit) = self.cache.get(&key) {
                debug!(provider = name, "embedding served from cache");
                self.record_served(name);
                return Ok(hit);
            }
            match provider.embed_text(text).await {
                Ok(embedding) => {
                    self.cache.insert(key, embedding.clone());
                    self.record_served(name);
                    return Ok(embedding);
                }
                Err(err) => {
                    warn!(provider = name, error = %err, "embedding provider failed, trying next");
                    attempts.push((name.to_string(), err.to_string()));
                }
            }
        }
        Err(EmbedError::AllProvidersFailed { attempts })
    }

    /// Embed a batch, preserving input order exactly.
    ///
    /// Cached texts are filled in without touching the provider; the rest
    /// go out in sub-batches of at most `max_batch_size`. If any sub-batch
    /// fails the whole request moves to the next provider so every vector
    /// in one response comes from a single model.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let mut attempts = Vec::new();
        'chain: for provider in &self.providers {
            let name = provider.provider_name();
            let model_id = provider.model_id();
            let keys: Vec<String> = texts.iter().map(|t| cache_key(t, &model_id)).collect();

            let mut slots: Vec<Option<Vec<f32>>> =
                keys.iter().map(|key| self.cache.get(key)).collect();
            let uncached: Vec<usize> = slots
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.is_none().then_some(i))
                .collect();

            if !uncached.is_empty() {
                debug!(
                    provider = name,
                    cached = texts.len() - uncached.len(),
                    uncached = uncached.len(),
                    "embedding batch"
                );
            }

            for batch_indices in uncached.chunks(provider.max_batch_size().max(1)) {
                let batch: Vec<String> =
                    batch_indices.iter().map(|&i| texts[i].clone()).collect();
                let result = match provider.embed_texts(&batch).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(provider = name, error = %err, "embedding provider failed, trying next");
                        attempts.push((name.to_string(), err.to_string()));
                        continue 'chain;
                    }
                };
                if result.len() != batch.len() {
                    attempts.push((
                        name.to_string(),
                        format!("expected {} embeddings, got {}", batch.len(), result.len()),
                    ));
                    continue 'chain;
                }
                for (&i, embedding) in batch_indices.iter().zip(result.embeddings) {
                    self.cache.insert(keys[i].clone(), embedding.clone());
                    slots[i] = Some(embedding);
                }
            }

            self.record_served(name);
            let embeddings = slots.into_iter().flatten().collect();
            return Ok(EmbeddingResult::new(embeddings));
        }
        Err(EmbedError::AllProvidersFailed { attempts })
    }

    /// Dimension every vector from this service has.
    pub fn dimension(&self) -> usize {
        self.providers[0].embedding_dimension()
    }

    /// Model identifier of the primary provider; stored alongside the index
    /// so later opens can detect a model switch.
    pub fn model_id(&self) -> String {
        self.providers[0].model_id()
    }

    /// Name of the provider that served the most recent request, if any.
    pub fn last_served(&self) -> Option<String> {
        self.served_slot().clone()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.provider_name().to_string())
            .collect()
    }

    pub fn cache_stats(&self) -> folio_cache::CacheStats {
        self.cache.stats()
    }

    fn record_served(&self, name: &str) {
        *self.served_slot() = Some(name.to_string());
    }

    fn served_slot(&self) -> MutexGuard<'_, Option<String>> {
        match self.last_served.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: &'static str,
        dimension: usize,
        fail: bool,
        max_batch: usize,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl StubProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                dimension: 2,
                fail: false,
                max_batch: 32,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            vec![text.len() as f32; self.dimension]
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbedError::provider(self.name, "stub failure"));
            }
            Ok(self.vector_for(text))
        }

        async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(texts.len());
            if self.fail {
                return Err(EmbedError::provider(self.name, "stub failure"));
            }
            Ok(EmbeddingResult::new(
                texts.iter().map(|t| self.vector_for(t)).collect(),
            ))
        }

        fn embedding_dimension(&self) -> usize {
            self.dimension
        }

        fn provider_name(&self) -> &str {
            self.name
        }

        fn model_id(&self) -> String {
            format!("{}:stub:1:{}:raw", self.name, self.dimension)
        }

        fn max_batch_size(&self) -> usize {
            self.max_batch
        }
    }

    fn test_cache() -> Arc<TtlCache<String, Vec<f32>>> {
        Arc::new(TtlCache::new(128, None))
    }

    #[tokio::test]
    async fn test_embed_text_caches_result() {
        let primary = Arc::new(StubProvider::new("primary"));
        let service =
            EmbeddingService::new(vec![primary.clone()], test_cache()).unwrap();

        let first = service.embed_text("hegel").await.unwrap();
        let second = service.embed_text("hegel").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(primary.calls(), 1);
        assert_eq!(service.last_served().as_deref(), Some("primary"));
    }

    #[tokio::test]
    async fn test_fallback_advances_to_secondary() {
        let primary = Arc::new(StubProvider::failing("primary"));
        let secondary = Arc::new(StubProvider::new("secondary"));
        let service = EmbeddingService::new(
            vec![primary.clone(), secondary.clone()],
            test_cache(),
        )
        .unwrap();

        let embedding = service.embed_text("kant").await.unwrap();
        assert_eq!(embedding, vec![4.0, 4.0]);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(service.last_served().as_deref(), Some("secondary"));
    }

    #[tokio::test]
    async fn test_all_providers_failed_lists_attempts_in_order() {
        let service = EmbeddingService::new(
            vec![
                Arc::new(StubProvider::failing("primary")),
                Arc::new(StubProvider::failing("secondary")),
            ],
            test_cache(),
        )
        .unwrap();

        let err = service.embed_text("spinoza").await.unwrap_err();
        match &err {
            EmbedError::AllProvidersFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, "primary");
                assert_eq!(attempts[1].0, "secondary");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("primary"));
        assert!(message.contains("secondary"));
    }

    #[tokio::test]
    async fn test_construction_rejects_empty_chain() {
        let err = EmbeddingService::new(vec![], test_cache()).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_construction_rejects_mixed_dimensions() {
        let primary = Arc::new(StubProvider::new("primary"));
        let odd = Arc::new(StubProvider {
            dimension: 3,
            ..StubProvider::new("odd")
        });
        let err = EmbeddingService::new(vec![primary, odd], test_cache()).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let primary = Arc::new(StubProvider::new("primary"));
        let service = EmbeddingService::new(vec![primary], test_cache()).unwrap();

        let texts = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
        let result = service.embed_texts(&texts).await.unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.embeddings[0], vec![1.0, 1.0]);
        assert_eq!(result.embeddings[1], vec![3.0, 3.0]);
        assert_eq!(result.embeddings[2], vec![2.0, 2.0]);
        assert_eq!(result.dimension, 2);
    }

    #[tokio::test]
    async fn test_batch_skips_cached_texts() {
        let primary = Arc::new(StubProvider::new("primary"));
        let service = EmbeddingService::new(vec![primary.clone()], test_cache()).unwrap();

        service.embed_text("warm").await.unwrap();
        let texts = vec![
            "warm".to_string(),
            "cold one".to_string(),
            "cold two".to_string(),
        ];
        let result = service.embed_texts(&texts).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.embeddings[0], vec![4.0, 4.0]);
        // One single-text call plus one batch carrying only the two misses.
        assert_eq!(primary.batch_sizes.lock().unwrap().as_slice(), &[2]);
    }

    #[tokio::test]
    async fn test_batch_respects_max_batch_size() {
        let primary = Arc::new(StubProvider {
            max_batch: 2,
            ..StubProvider::new("primary")
        });
        let service = EmbeddingService::new(vec![primary.clone()], test_cache()).unwrap();

        let texts: Vec<String> = (0..5).map(|i| format!("text-{i}")).collect();
        let result = service.embed_texts(&texts).await.unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(primary.batch_sizes.lock().unwrap().as_slice(), &[2, 2, 1]);
    }

    #[tokio::test]
    async fn test_batch_fallback_moves_whole_request() {
        let primary = Arc::new(StubProvider::failing("primary"));
        let secondary = Arc::new(StubProvider::new("secondary"));
        let service = EmbeddingService::new(
            vec![primary.clone(), secondary.clone()],
            test_cache(),
        )
        .unwrap();

        let texts = vec!["x".to_string(), "yy".to_string()];
        let result = service.embed_texts(&texts).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(secondary.batch_sizes.lock().unwrap().as_slice(), &[2]);
        assert_eq!(service.last_served().as_deref(), Some("secondary"));
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let primary = Arc::new(StubProvider::new("primary"));
        let service = EmbeddingService::new(vec![primary.clone()], test_cache()).unwrap();

        let result = service.embed_texts(&[]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_key_separates_models() {
        assert_ne!(cache_key("text", "a:1"), cache_key("text", "b:1"));
        assert_ne!(cache_key("alpha", "a:1"), cache_key("beta", "a:1"));
        assert_eq!(cache_key("text", "a:1"), cache_key("text", "a:1"));
    }
}
