//! RagChat RAG - Retrieval-Augmented Generation pipeline
//!
//! This crate implements the grounded chat pipeline:
//! - Offline indexing of a document directory into vector store artifacts
//! - Dense retrieval of the top-k chunks for a question
//! - Prompt assembly with numbered, scored context entries
//! - Chat orchestration around an LLM client, degrading to plain chat
//!   when retrieval is unavailable
//!
//! Author: hephaex@gmail.com

pub mod cache;
pub mod indexer;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;

pub use cache::{CacheStats, CachedEmbedder};
pub use indexer::{DocumentIndexer, IndexReport};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use orchestrator::{ChatOrchestrator, ChatReply, SpokenReply};
pub use prompt::{PromptAssembler, DEFAULT_SYSTEM_PROMPT};
pub use retriever::{Retriever, RetrieverState};

// ============================================================================
// Test doubles
// ============================================================================
