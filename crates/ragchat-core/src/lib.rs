//! RagChat Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the RagChat system:
//! - Document chunks and search results
//! - Conversation turns and the conversation store
//! - Common error types
//! - Shared traits for the language model and speech-to-text collaborators
//! - Configuration management

pub mod config;
pub mod conversation;

pub use config::{
    AppConfig, ChatConfig, ConfigError, DatabaseConfig, EmbeddingConfig, IndexConfig, LlmConfig,
    LlmProvider, LoggingConfig,
};
pub use conversation::{
    Conversation, ConversationStore, MemoryConversationStore, SqliteConversationStore, StoredTurn,
};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for RagChat operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Index integrity error: {0}")]
    Index(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmFailure),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Ways a language model call can fail.
///
/// Kept apart from the other variants so callers can tell a failed
/// generation from a failed retrieval and decide whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmFailure {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("model returned an empty reply")]
    EmptyReply,
}

impl ChatError {
    /// Whether this error came from the language model call
    pub fn is_llm_failure(&self) -> bool {
        matches!(self, Self::Llm(_))
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// Where a chunk came from: source file name and position within it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source file name (not the full path)
    pub source: String,

    /// Sequence index of the chunk within its source
    pub chunk_id: u32,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, chunk_id: u32) -> Self {
        Self {
            source: source.into(),
            chunk_id,
        }
    }
}

/// A chunk of document content, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Text content
    pub text: String,

    /// Source file name
    pub source: String,

    /// Chunk index within the source
    pub chunk_id: u32,
}

impl DocumentChunk {
    /// Create a new chunk
    pub fn new(text: impl Into<String>, source: impl Into<String>, chunk_id: u32) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            chunk_id,
        }
    }

    /// Metadata half of the chunk, as stored next to the vector
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata::new(self.source.clone(), self.chunk_id)
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chunk text
    pub chunk_text: String,

    /// Source file and chunk index
    pub metadata: ChunkMetadata,

    /// Inner-product similarity (higher is better)
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk_text: impl Into<String>, metadata: ChunkMetadata, score: f32) -> Self {
        Self {
            chunk_text: chunk_text.into(),
            metadata,
            score,
        }
    }
}

// ============================================================================
// Conversation Types
// ============================================================================

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ChatError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for chat-capable language model clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `history` followed by `prompt` as the user message and return
    /// the assistant reply.
    async fn chat(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Trait for speech-to-text engines
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a saved audio file. An empty string means no speech was
    /// detected.
    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================
