//! Remote embedding providers backed by HTTP APIs.
//!
//! Three backends are supported: OpenAI-compatible `/embeddings` endpoints,
//! Google Vertex AI `:predict`, and a local Ollama daemon. All share the
//! same error mapping: transport failures surface as [`EmbedError::Http`],
//! non-success statuses become [`EmbedError::Provider`] carrying the
//! response body.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{OllamaConfig, OpenAiConfig, VertexConfig};
use crate::error::{EmbedError, Result};
use crate::provider::{truncate_text, EmbeddingProvider, EmbeddingResult};

/// OpenAI-compatible embeddings client (also covers Azure-style and other
/// `/v1/embeddings` servers via `base_url`).
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let dimension = config.dimension()?;
        Ok(Self {
            client: Client::new(),
            config,
            dimension,
        })
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = OpenAiRequest {
            model: &self.config.model,
            input: inputs,
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::provider(
                "openai",
                format!("HTTP {status}: {body}"),
            ));
        }

        let mut parsed: OpenAiResponse = response.json().await?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbedError::provider(
                "openai",
                format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    parsed.data.len()
                ),
            ));
        }
        // The API may return entries out of order; index restores it.
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_text(text, self.max_text_length(), self.provider_name());
        let mut embeddings = self.request(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbedError::provider("openai", "empty response data"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_text(t, self.max_text_length(), self.provider_name()))
            .collect();
        let embeddings = self.request(&inputs).await?;
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> String {
        format!("openai:{}:1:{}:norm", self.config.model, self.dimension)
    }
}

/// Google Vertex AI text embedding client.
#[derive(Debug, Clone)]
pub struct VertexProvider {
    client: Client,
    config: VertexConfig,
    dimension: usize,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct VertexRequest<'a> {
    instances: Vec<VertexInstance<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<VertexParameters>,
}

#[derive(Debug, Serialize)]
struct VertexInstance<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexParameters {
    output_dimensionality: usize,
}

#[derive(Debug, Deserialize)]
struct VertexResponse {
    predictions: Vec<VertexPrediction>,
}

#[derive(Debug, Deserialize)]
struct VertexPrediction {
    embeddings: VertexEmbeddings,
}

#[derive(Debug, Deserialize)]
struct VertexEmbeddings {
    values: Vec<f32>,
}

impl VertexProvider {
    pub fn new(config: VertexConfig) -> Result<Self> {
        let dimension = config.dimension()?;
        let endpoint = format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/{model}:predict",
            loc = config.location,
            proj = config.project_id,
            model = config.model,
        );
        Ok(Self {
            client: Client::new(),
            config,
            dimension,
            endpoint,
        })
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = VertexRequest {
            instances: inputs
                .iter()
                .map(|content| VertexInstance { content })
                .collect(),
            parameters: self
                .config
                .output_dimensionality
                .map(|output_dimensionality| VertexParameters {
                    output_dimensionality,
                }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::provider(
                "vertex",
                format!("HTTP {status}: {body}"),
            ));
        }

        let parsed: VertexResponse = response.json().await?;
        if parsed.predictions.len() != inputs.len() {
            return Err(EmbedError::provider(
                "vertex",
                format!(
                    "expected {} predictions, got {}",
                    inputs.len(),
                    parsed.predictions.len()
                ),
            ));
        }
        Ok(parsed
            .predictions
            .into_iter()
            .map(|p| p.embeddings.values)
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for VertexProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_text(text, self.max_text_length(), self.provider_name());
        let mut embeddings = self.request(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbedError::provider("vertex", "empty predictions"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_text(t, self.max_text_length(), self.provider_name()))
            .collect();
        let embeddings = self.request(&inputs).await?;
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "vertex"
    }

    fn model_id(&self) -> String {
        format!("vertex:{}:1:{}:norm", self.config.model, self.dimension)
    }

    // Vertex caps predict instances well below the OpenAI batch limit.
    fn max_batch_size(&self) -> usize {
        16
    }
}

/// Local Ollama daemon client. The `/api/embeddings` endpoint accepts a
/// single prompt per call, so batches run as sequential requests.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let dimension = config.dimension()?;
        Ok(Self {
            client: Client::new(),
            config,
            dimension,
        })
    }

    async fn request_one(&self, prompt: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/api/embeddings",
            self.config.endpoint.trim_end_matches('/')
        );
        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::provider(
                "ollama",
                format!("HTTP {status}: {body}"),
            ));
        }

        let parsed: OllamaResponse = response.json().await?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_text(text, self.max_text_length(), self.provider_name());
        self.request_one(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let text = truncate_text(text, self.max_text_length(), self.provider_name());
            embeddings.push(self.request_one(text).await?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_id(&self) -> String {
        format!("ollama:{}:1:{}:raw", self.config.model, self.dimension)
    }
}
