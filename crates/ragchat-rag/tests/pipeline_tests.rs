//! Pipeline Integration Tests
//!
//! Index a directory of documents, load the artifacts back and answer
//! questions through the orchestrator, with a deterministic embedder and a
//! scripted language model standing in for the external services.
//!
//! Author: hephaex@gmail.com

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{
    ChatConfig, ChatError, ConversationStore, ConversationTurn, LlmClient, LlmFailure,
    MemoryConversationStore, Result, Role,
};
use ragchat_parser::ChunkConfig;
use ragchat_rag::{
    CachedEmbedder, ChatOrchestrator, DocumentIndexer, PromptAssembler, Retriever, RetrieverState,
};
use ragchat_vector::{normalize_l2, Embedder};
use tempfile::TempDir;

// =============================================================================
// Test doubles
// =============================================================================

/// Bag-of-words embedder over a fixed vocabulary
struct VocabularyEmbedder {
    vocabulary: Vec<&'static str>,
    calls: AtomicUsize,
}

impl VocabularyEmbedder {
    fn new() -> Self {
        Self {
            vocabulary: vec![
                "refund", "day", "ship", "order", "support", "weekday", "password", "reset",
            ],
            calls: AtomicUsize::new(0),
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .vocabulary
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        // Constant component keeps every vector non-zero
        vector.push(0.1);
        normalize_l2(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len() + 1
    }

    fn model(&self) -> &str {
        "vocabulary"
    }
}

/// LLM echoing a canned reply and recording prompts
struct RecordingLlm {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn chat(&self, prompt: &str, _history: &[ConversationTurn]) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model(&self) -> &str {
        "recording"
    }
}

struct DownLlm;

#[async_trait]
impl LlmClient for DownLlm {
    async fn chat(&self, _prompt: &str, _history: &[ConversationTurn]) -> Result<String> {
        Err(LlmFailure::Status {
            status: 503,
            body: "model loading".to_string(),
        }
        .into())
    }

    fn model(&self) -> &str {
        "down"
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn write_docs(dir: &TempDir) {
    fs::write(
        dir.path().join("policy.txt"),
        "Refunds are processed within 30 days.",
    )
    .unwrap();
    fs::write(
        dir.path().join("shipping.md"),
        "# Shipping\nOrders ship within two business days.",
    )
    .unwrap();
    fs::write(
        dir.path().join("support.txt"),
        "Support is available on weekdays. Use the portal to reset a password.",
    )
    .unwrap();
}

async fn build_index(embedder: Arc<dyn Embedder>) -> (TempDir, TempDir) {
    let docs = TempDir::new().unwrap();
    write_docs(&docs);
    let out = TempDir::new().unwrap();

    DocumentIndexer::new(embedder, ChunkConfig::default())
        .run(docs.path(), &out.path().join("vector_store"))
        .await
        .unwrap();

    (docs, out)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_refund_question_end_to_end() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabularyEmbedder::new());
    let (_docs, out) = build_index(embedder.clone()).await;

    let state = RetrieverState::load(out.path().join("vector_store"), embedder);
    let retriever = state.retriever().unwrap().clone();
    assert_eq!(retriever.len(), 3);

    let results = retriever.search("How long do refunds take?", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_text, "Refunds are processed within 30 days.");
    assert_eq!(results[0].metadata.source, "policy.txt");
    assert_eq!(results[0].metadata.chunk_id, 0);

    let llm = RecordingLlm::new("Refunds are processed within 30 days [1].");
    let chat = ChatOrchestrator::new(state, llm.clone(), ChatConfig::default());
    let reply = chat
        .respond_detailed("How long do refunds take?", &[], true)
        .await
        .unwrap();

    assert_eq!(reply.cited, vec![1]);
    assert_eq!(reply.sources[0].metadata.source, "policy.txt");

    let expected_prompt =
        PromptAssembler::new().assemble("How long do refunds take?", &reply.sources);
    assert_eq!(llm.last_prompt(), expected_prompt);
    let prompt = llm.last_prompt();
    assert!(prompt.contains("Context:\n[1] (score 0."));
    assert!(prompt.contains(" src:policy.txt)\nRefunds are processed within 30 days.\n\n[2] (score "));
    assert!(prompt.ends_with("\n\nUser:\nHow long do refunds take?"));
}

#[tokio::test]
async fn test_search_is_ordered_and_bounded() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabularyEmbedder::new());
    let (_docs, out) = build_index(embedder.clone()).await;
    let retriever = Retriever::open(out.path().join("vector_store"), embedder).unwrap();

    for k in 1..=6 {
        let results = retriever.search("reset my password", k).await.unwrap();
        assert_eq!(results.len(), k.min(3));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    let top = retriever.search("reset my password", 1).await.unwrap();
    assert_eq!(top[0].metadata.source, "support.txt");

    // Same index, same query, same answer
    let again = retriever.search("reset my password", 3).await.unwrap();
    let once_more = retriever.search("reset my password", 3).await.unwrap();
    assert_eq!(again, once_more);
}

#[tokio::test]
async fn test_reindexing_replaces_artifacts() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabularyEmbedder::new());
    let (docs, out) = build_index(embedder.clone()).await;
    let index_dir = out.path().join("vector_store");

    fs::remove_file(docs.path().join("shipping.md")).unwrap();
    let report = DocumentIndexer::new(embedder.clone(), ChunkConfig::default())
        .run(docs.path(), &index_dir)
        .await
        .unwrap();
    assert_eq!(report.documents, 2);

    let retriever = Retriever::open(&index_dir, embedder).unwrap();
    assert_eq!(retriever.len(), 2);
    let results = retriever.search("when do orders ship", 2).await.unwrap();
    assert!(results.iter().all(|r| r.metadata.source != "shipping.md"));
}

#[tokio::test]
async fn test_missing_index_degrades_to_plain_chat() {
    let empty = TempDir::new().unwrap();
    let state = RetrieverState::load(empty.path(), Arc::new(VocabularyEmbedder::new()));
    assert!(!state.is_available());

    let llm = RecordingLlm::new("Hello!");
    let chat = ChatOrchestrator::new(state, llm.clone(), ChatConfig::default());
    let reply = chat.respond("Hi", &[], true).await.unwrap();

    assert_eq!(reply, "Hello!");
    assert_eq!(llm.last_prompt(), "Hi");
}

#[tokio::test]
async fn test_llm_failure_reaches_caller() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabularyEmbedder::new());
    let (_docs, out) = build_index(embedder.clone()).await;
    let state = RetrieverState::load(out.path().join("vector_store"), embedder);

    let chat = ChatOrchestrator::new(state, Arc::new(DownLlm), ChatConfig::default());
    let err = chat.respond("Refunds?", &[], true).await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Llm(LlmFailure::Status { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_cached_query_embeddings() {
    let inner = Arc::new(VocabularyEmbedder::new());
    let (_docs, out) = build_index(inner.clone()).await;
    let indexing_calls = inner.calls.load(Ordering::SeqCst);

    let cached = Arc::new(CachedEmbedder::new(
        inner.clone(),
        100,
        Duration::from_secs(60),
    ));
    let retriever = Retriever::open(out.path().join("vector_store"), cached.clone()).unwrap();

    let first = retriever.search("refund", 2).await.unwrap();
    let second = retriever.search("refund", 2).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(inner.calls.load(Ordering::SeqCst), indexing_calls + 1);
    assert_eq!(cached.stats().hits(), 1);
}

#[tokio::test]
async fn test_conversation_round_trip() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabularyEmbedder::new());
    let (_docs, out) = build_index(embedder.clone()).await;
    let state = RetrieverState::load(out.path().join("vector_store"), embedder);
    let llm = RecordingLlm::new("Within 30 days.");
    let chat = ChatOrchestrator::new(state, llm, ChatConfig::default());

    let store = MemoryConversationStore::new();
    let conversation = store.create_conversation("Refunds").await.unwrap();

    for question in ["How long do refunds take?", "And shipping?"] {
        let history = store.turns(conversation.id).await.unwrap();
        let reply = chat.respond(question, &history, true).await.unwrap();
        store
            .append_turn(conversation.id, &ConversationTurn::user(question), None)
            .await
            .unwrap();
        store
            .append_turn(conversation.id, &ConversationTurn::assistant(reply), None)
            .await
            .unwrap();
    }

    let turns = store.turns(conversation.id).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[3].role, Role::Assistant);
}
