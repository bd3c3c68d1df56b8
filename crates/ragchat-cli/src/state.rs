//! Service wiring for CLI commands
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use anyhow::Context;
use ragchat_core::{AppConfig, ConversationStore, LlmClient, SqliteConversationStore};
use ragchat_rag::{create_llm_client, CachedEmbedder, ChatOrchestrator, RetrieverState};
use ragchat_vector::{create_embedder, Embedder};
use tracing::info;

/// Configuration plus the clients built from it
pub struct AppState {
    pub config: AppConfig,
    embedder: Arc<dyn Embedder>,
}

impl AppState {
    /// Build the embedding client from `config`
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(
            create_embedder(&config.embedding).context("Failed to create embedding client")?,
        );
        Ok(Self { config, embedder })
    }

    /// Embedder used for indexing documents
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Embedder used for questions, with the query cache in front
    pub fn query_embedder(&self) -> Arc<dyn Embedder> {
        if self.config.embedding.cache_capacity == 0 {
            return self.embedder();
        }
        Arc::new(CachedEmbedder::from_config(
            self.embedder(),
            &self.config.embedding,
        ))
    }

    /// Load the index; failure leaves retrieval unavailable
    pub fn retriever(&self) -> RetrieverState {
        RetrieverState::load(&self.config.index.index_dir, self.query_embedder())
    }

    pub fn llm_client(&self) -> anyhow::Result<Arc<dyn LlmClient>> {
        let client = create_llm_client(&self.config.llm).context("Failed to create LLM client")?;
        Ok(Arc::from(client))
    }

    /// Orchestrator over the persisted index and the configured model
    pub fn orchestrator(&self) -> anyhow::Result<ChatOrchestrator> {
        let retriever = self.retriever();
        if let Some(retriever) = retriever.retriever() {
            info!("Vector index ready: {} chunks", retriever.len());
        }
        Ok(ChatOrchestrator::new(
            retriever,
            self.llm_client()?,
            self.config.chat.clone(),
        ))
    }

    /// Open the conversation database
    pub async fn conversation_store(&self) -> anyhow::Result<Arc<dyn ConversationStore>> {
        let store = SqliteConversationStore::connect(&self.config.database)
            .await
            .with_context(|| format!("Failed to open {}", self.config.database.url))?;
        Ok(Arc::new(store))
    }
}
