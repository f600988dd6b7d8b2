//! Provider configuration with fail-fast validation.
//!
//! Each provider kind carries its own settings struct; [`ProviderConfig`]
//! ties them together as a tagged enum so chains deserialize directly from
//! the application config file. Validation runs at construction time:
//! missing credentials, endpoints, regions, or out-of-range dimension
//! requests are rejected before any request is made.

use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};

/// Default dimension for the deterministic mock provider.
pub const DEFAULT_MOCK_DIMENSION: usize = 384;

/// Configuration for one provider in a fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderConfig {
    #[serde(rename = "mock")]
    Mock(MockConfig),
    #[serde(rename = "openai")]
    OpenAi(OpenAiConfig),
    #[serde(rename = "vertex")]
    Vertex(VertexConfig),
    #[serde(rename = "ollama")]
    Ollama(OllamaConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Mock(_) => "mock",
            ProviderConfig::OpenAi(_) => "openai",
            ProviderConfig::Vertex(_) => "vertex",
            ProviderConfig::Ollama(_) => "ollama",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Mock(c) => c.validate(),
            ProviderConfig::OpenAi(c) => c.validate(),
            ProviderConfig::Vertex(c) => c.validate(),
            ProviderConfig::Ollama(c) => c.validate(),
        }
    }
}

/// Deterministic offline provider, mainly for tests and local development.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_dimension")]
    pub dimension: usize,
}

fn default_mock_dimension() -> usize {
    DEFAULT_MOCK_DIMENSION
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_MOCK_DIMENSION,
        }
    }
}

impl MockConfig {
    fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > 8192 {
            return Err(EmbedError::invalid_config(format!(
                "mock dimension {} out of range 1..=8192",
                self.dimension
            )));
        }
        Ok(())
    }
}

/// OpenAI-compatible embeddings endpoint: bearer auth, true batch API,
/// optional requested dimensionality within the model's maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Requested output dimensionality; only some models accept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_openai_model(),
            base_url: default_openai_base_url(),
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Native dimension and whether the model accepts a `dimensions` request.
    fn model_profile(&self) -> Option<(usize, bool)> {
        match self.model.as_str() {
            "text-embedding-3-small" => Some((1536, true)),
            "text-embedding-3-large" => Some((3072, true)),
            "text-embedding-ada-002" => Some((1536, false)),
            _ => None,
        }
    }

    /// Effective output dimension after validation.
    pub fn dimension(&self) -> Result<usize> {
        self.validate()?;
        match (self.dimensions, self.model_profile()) {
            (Some(d), _) => Ok(d),
            (None, Some((native, _))) => Ok(native),
            // validate() already rejected this combination
            (None, None) => Err(EmbedError::invalid_config(format!(
                "unknown OpenAI model '{}' requires explicit dimensions",
                self.model
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::invalid_config("OpenAI api_key is required"));
        }
        if self.base_url.trim().is_empty() {
            return Err(EmbedError::invalid_config("OpenAI base_url is required"));
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("OpenAI model is required"));
        }
        match (self.dimensions, self.model_profile()) {
            (Some(0), _) => Err(EmbedError::invalid_config("dimensions must be positive")),
            (Some(d), Some((native, true))) if d > native => {
                Err(EmbedError::invalid_config(format!(
                    "dimensions {d} exceeds maximum {native} for model '{}'",
                    self.model
                )))
            }
            (Some(_), Some((_, false))) => Err(EmbedError::invalid_config(format!(
                "model '{}' does not accept a dimensions request",
                self.model
            ))),
            (None, None) => Err(EmbedError::invalid_config(format!(
                "unknown OpenAI model '{}' requires explicit dimensions",
                self.model
            ))),
            _ => Ok(()),
        }
    }
}

/// Google Vertex AI text embeddings. Requires the project and the region
/// the model is served from; the endpoint is derived from both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexConfig {
    pub project_id: String,
    /// Region such as `us-central1`; part of the endpoint host.
    pub location: String,
    pub access_token: String,
    #[serde(default = "default_vertex_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dimensionality: Option<usize>,
}

fn default_vertex_model() -> String {
    "text-embedding-005".to_string()
}

impl VertexConfig {
    fn model_native_dimension(&self) -> Option<usize> {
        match self.model.as_str() {
            "text-embedding-005" | "text-embedding-004" | "text-multilingual-embedding-002" => {
                Some(768)
            }
            "gemini-embedding-001" => Some(3072),
            _ => None,
        }
    }

    pub fn dimension(&self) -> Result<usize> {
        self.validate()?;
        match (self.output_dimensionality, self.model_native_dimension()) {
            (Some(d), _) => Ok(d),
            (None, Some(native)) => Ok(native),
            (None, None) => Err(EmbedError::invalid_config(format!(
                "unknown Vertex model '{}' requires explicit output_dimensionality",
                self.model
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(EmbedError::invalid_config("Vertex project_id is required"));
        }
        if self.location.trim().is_empty() {
            return Err(EmbedError::invalid_config(
                "Vertex location (region) is required",
            ));
        }
        if self.access_token.trim().is_empty() {
            return Err(EmbedError::invalid_config("Vertex access_token is required"));
        }
        match (self.output_dimensionality, self.model_native_dimension()) {
            (Some(0), _) => Err(EmbedError::invalid_config(
                "output_dimensionality must be positive",
            )),
            (Some(d), Some(native)) if d > native => Err(EmbedError::invalid_config(format!(
                "output_dimensionality {d} exceeds maximum {native} for model '{}'",
                self.model
            ))),
            (None, None) => Err(EmbedError::invalid_config(format!(
                "unknown Vertex model '{}' requires explicit output_dimensionality",
                self.model
            ))),
            _ => Ok(()),
        }
    }
}

/// Local Ollama daemon. No authentication; the embeddings API takes one
/// prompt per request, so batches are served sequentially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    /// Required for models this crate does not know the dimension of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_ollama_model(),
            dimension: None,
        }
    }
}

impl OllamaConfig {
    fn model_native_dimension(&self) -> Option<usize> {
        match self.model.as_str() {
            "nomic-embed-text" => Some(768),
            "mxbai-embed-large" => Some(1024),
            "all-minilm" => Some(384),
            _ => None,
        }
    }

    pub fn dimension(&self) -> Result<usize> {
        self.validate()?;
        match (self.dimension, self.model_native_dimension()) {
            (Some(d), _) => Ok(d),
            (None, Some(native)) => Ok(native),
            (None, None) => Err(EmbedError::invalid_config(format!(
                "unknown Ollama model '{}' requires explicit dimension",
                self.model
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EmbedError::invalid_config("Ollama endpoint is required"));
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("Ollama model is required"));
        }
        if self.dimension == Some(0) {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        if self.dimension.is_none() && self.model_native_dimension().is_none() {
            return Err(EmbedError::invalid_config(format!(
                "unknown Ollama model '{}' requires explicit dimension",
                self.model
            )));
        }
        Ok(())
    }
}
