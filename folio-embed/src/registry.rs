//! Registry mapping provider kinds to constructors.
//!
//! The default registry knows the four built-in kinds. Tests and embedders
//! can re-register a kind to substitute their own implementation without
//! touching the config format.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, MockProvider};
use crate::remote::{OllamaProvider, OpenAiProvider, VertexProvider};

type ProviderFactory =
    Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;

pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry with no kinds registered.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in provider kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("mock", |config| match config {
            ProviderConfig::Mock(c) => Ok(arc(MockProvider::new(c.clone()))),
            other => Err(mismatch("mock", other)),
        });
        registry.register("openai", |config| match config {
            ProviderConfig::OpenAi(c) => Ok(arc(OpenAiProvider::new(c.clone())?)),
            other => Err(mismatch("openai", other)),
        });
        registry.register("vertex", |config| match config {
            ProviderConfig::Vertex(c) => Ok(arc(VertexProvider::new(c.clone())?)),
            other => Err(mismatch("vertex", other)),
        });
        registry.register("ollama", |config| match config {
            ProviderConfig::Ollama(c) => Ok(arc(OllamaProvider::new(c.clone())?)),
            other => Err(mismatch("ollama", other)),
        });
        registry
    }

    /// Register (or replace) the factory for a kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Build one provider from its config, validating it first.
    pub fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        config.validate()?;
        let factory = self.factories.get(config.kind()).ok_or_else(|| {
            EmbedError::invalid_config(format!("unknown provider kind '{}'", config.kind()))
        })?;
        factory(config)
    }

    /// Build a fallback chain in config order.
    pub fn build_chain(&self, configs: &[ProviderConfig]) -> Result<Vec<Arc<dyn EmbeddingProvider>>> {
        configs.iter().map(|config| self.build(config)).collect()
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn arc<P: EmbeddingProvider + 'static>(provider: P) -> Arc<dyn EmbeddingProvider> {
    Arc::new(provider)
}

fn mismatch(expected: &str, got: &ProviderConfig) -> EmbedError {
    EmbedError::invalid_config(format!(
        "factory for '{expected}' received a '{}' config",
        got.kind()
    ))
}
