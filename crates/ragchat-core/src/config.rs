//! RagChat Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for a local Ollama setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Chat model configuration
    pub llm: LlmConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Vector index and offline indexing configuration
    pub index: IndexConfig,

    /// Chat orchestration configuration
    pub chat: ChatConfig,

    /// Conversation store
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOP_K".to_string(),
                value: "0".to_string(),
            });
        }
        if self.index.chunk_overlap == 0 || self.index.chunk_overlap >= self.index.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "CHUNK_OVERLAP".to_string(),
                value: format!(
                    "{} (must be between 1 and chunk size {})",
                    self.index.chunk_overlap, self.index.chunk_size
                ),
            });
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_BATCH_SIZE".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(url) = std::env::var("OLLAMA_HOST") {
            self.llm.ollama_url = url.clone();
            self.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key.clone());
            self.embedding.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(temperature) = std::env::var("LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("LLM_TEMPERATURE", temperature)?;
        }
        if let Ok(secs) = std::env::var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", secs)?;
        }

        // Embeddings
        if let Ok(provider) = std::env::var("EMBEDDINGS_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDINGS_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(url) = std::env::var("EMBEDDINGS_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(size) = std::env::var("EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = parse_env("EMBEDDING_BATCH_SIZE", size)?;
        }
        if let Ok(secs) = std::env::var("EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = parse_env("EMBEDDING_TIMEOUT_SECS", secs)?;
        }

        // Index
        if let Ok(dir) = std::env::var("INDEX_DIR") {
            self.index.index_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DOCS_DIR") {
            self.index.docs_dir = PathBuf::from(dir);
        }
        if let Ok(size) = std::env::var("CHUNK_SIZE") {
            self.index.chunk_size = parse_env("CHUNK_SIZE", size)?;
        }
        if let Ok(overlap) = std::env::var("CHUNK_OVERLAP") {
            self.index.chunk_overlap = parse_env("CHUNK_OVERLAP", overlap)?;
        }

        // Chat
        if let Ok(k) = std::env::var("TOP_K") {
            self.chat.top_k = parse_env("TOP_K", k)?;
        }
        if let Ok(turns) = std::env::var("MAX_HISTORY_TURNS") {
            self.chat.max_history_turns = parse_env("MAX_HISTORY_TURNS", turns)?;
        }

        // Conversation store
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Chat model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// Ollama server URL
    pub ollama_url: String,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible servers)
    pub openai_base_url: Option<String>,

    /// Model name to use
    pub model: String,

    /// Temperature for generation
    pub temperature: f32,

    /// Maximum tokens for completion (OpenAI only)
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            model: "gemma3:1b".to_string(),
            temperature: 0.4,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider
    pub provider: LlmProvider,

    /// Service base URL (Ollama host or OpenAI-compatible `/v1` root)
    pub base_url: String,

    /// API key for OpenAI-compatible services
    pub api_key: Option<String>,

    /// Embedding model name
    pub model: String,

    /// Texts per embedding request
    pub batch_size: usize,

    /// Embedding requests in flight during indexing
    pub concurrency: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Cached query embeddings (0 disables the cache)
    pub cache_capacity: u64,

    /// Query embedding cache TTL in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
            batch_size: 32,
            concurrency: 2,
            timeout_secs: 60,
            cache_capacity: 1_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    OpenAI,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding `index.bin` and `meta.json`
    pub index_dir: PathBuf,

    /// Directory of source documents for offline indexing
    pub docs_dir: PathBuf,

    /// Chunk window size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive windows in characters
    pub chunk_overlap: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("rag/vector_store"),
            docs_dir: PathBuf::from("data/company_docs"),
            chunk_size: 700,
            chunk_overlap: 80,
        }
    }
}

/// Chat orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of chunks retrieved per grounded turn
    pub top_k: usize,

    /// Ground prompts by default
    pub use_grounding: bool,

    /// Most recent prior turns forwarded to the model
    pub max_history_turns: usize,

    /// Prompt sent when the user input is empty (e.g. silent audio)
    pub empty_input_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            use_grounding: true,
            max_history_turns: 20,
            empty_input_prompt: "User sent empty audio.".to_string(),
        }
    }
}

/// Conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://chat.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::ChatError {
    fn from(err: ConfigError) -> Self {
        crate::ChatError::Config(err.to_string())
    }
}
