//! Embedding client for generating vector representations
//!
//! Supports Ollama and OpenAI-compatible embedding APIs. Every vector
//! returned by an [`Embedder`] is L2-normalised, so inner product equals
//! cosine similarity.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use ragchat_core::{ChatError, EmbeddingConfig, LlmProvider, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate normalised embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate a normalised embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding("No embedding returned".to_string()))
    }

    /// Expected embedding dimension
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model(&self) -> &str;
}

/// Scale a vector to unit length in place; zero vectors are left untouched
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn finish_batch(expected: usize, mut embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(ChatError::Embedding(format!(
            "Expected {expected} embeddings, got {}",
            embeddings.len()
        )));
    }
    for embedding in &mut embeddings {
        normalize_l2(embedding);
    }
    Ok(embeddings)
}

/// Request timeout used until a config or `with_timeout` says otherwise
const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ChatError::Config(format!("Failed to build HTTP client: {e}")))
}

fn request_error(e: reqwest::Error, timeout_secs: u64) -> ChatError {
    if e.is_timeout() {
        ChatError::Embedding(format!("Embedding request timed out after {timeout_secs}s"))
    } else {
        ChatError::Embedding(format!("Embedding request failed: {e}"))
    }
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI-compatible embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            dimension,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| ChatError::Config("OpenAI API key required".to_string()))?;

        let mut embedder =
            Self::new(api_key.clone(), config.model.clone())?.with_timeout(config.timeout_secs)?;
        if config.base_url.contains("/v1") {
            embedder.base_url = config.base_url.trim_end_matches('/').to_string();
        }
        Ok(embedder)
    }

    /// Rebuild the HTTP client with a different request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = http_client(timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(self)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Embedding(format!(
                "OpenAI embedding error {status}: {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            ChatError::Embedding(format!("Failed to parse embedding response: {e}"))
        })?;

        // Sort by index and extract embeddings
        let mut data = result.data;
        data.sort_by_key(|e| e.index);

        finish_batch(texts.len(), data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let dimension = match model.split(':').next().unwrap_or_default() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            "paraphrase-multilingual" => 768,
            "bge-m3" => 1024,
            _ => 768,
        };

        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.model.clone())?.with_timeout(config.timeout_secs)
    }

    /// Rebuild the HTTP client with a different request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = http_client(timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(self)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Embedding(format!(
                "Ollama embedding error {status}: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            ChatError::Embedding(format!("Failed to parse embedding response: {e}"))
        })?;

        finish_batch(texts.len(), result.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiEmbedding::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================
