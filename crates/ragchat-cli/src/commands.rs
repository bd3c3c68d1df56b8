//! Command implementations
//!
//! Answers go to stdout; logs go to stderr.
//!
//! Author: hephaex@gmail.com

use std::path::PathBuf;

use anyhow::{bail, Context};
use ragchat_core::{ConversationStore, ConversationTurn, SearchResult};
use ragchat_rag::{ChatOrchestrator, ChatReply, DocumentIndexer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::state::AppState;

/// Chunk, embed and persist every supported document in `dir`
pub async fn index(state: &AppState, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let docs_dir = dir.unwrap_or_else(|| state.config.index.docs_dir.clone());
    let index_dir = &state.config.index.index_dir;

    let indexer = DocumentIndexer::from_config(
        state.embedder(),
        &state.config.index,
        &state.config.embedding,
    )?;
    let report = indexer.run(&docs_dir, index_dir).await?;

    for (path, reason) in &report.skipped {
        println!("skipped {}: {reason}", path.display());
    }
    println!(
        "Indexed {} chunks from {} documents into {} (dimension {})",
        report.chunks,
        report.documents,
        index_dir.display(),
        report.dimension
    );
    Ok(())
}

/// Print the top `k` chunks for `query`
pub async fn search(state: &AppState, query: &str, k: Option<usize>, json: bool) -> anyhow::Result<()> {
    let k = k.unwrap_or(state.config.chat.top_k);
    let retriever_state = state.retriever();
    let Some(retriever) = retriever_state.retriever() else {
        bail!(
            "Vector index unavailable: {}",
            retriever_state.reason().unwrap_or("unknown reason")
        );
    };

    let results = retriever.search(query, k).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results.");
    } else {
        print_results(&results);
    }
    Ok(())
}

/// Answer one question, optionally inside a stored conversation
pub async fn ask(
    state: &AppState,
    question: &str,
    no_rag: bool,
    conversation: Option<i64>,
    show_sources: bool,
) -> anyhow::Result<()> {
    let chat = state.orchestrator()?;
    let use_grounding = state.config.chat.use_grounding && !no_rag;

    let reply = match conversation {
        Some(id) => {
            let store = state.conversation_store().await?;
            exchange(&chat, store.as_ref(), id, question, use_grounding).await?
        }
        None => chat.respond_detailed(question, &[], use_grounding).await?,
    };

    println!("{}", reply.text);
    if show_sources {
        print_sources(&reply);
    }
    Ok(())
}

/// Interactive chat persisted as a new conversation
pub async fn chat(state: &AppState, title: Option<String>, no_rag: bool) -> anyhow::Result<()> {
    let chat = state.orchestrator()?;
    if let Some(reason) = chat.retriever().reason() {
        println!("(retrieval unavailable, answering without documents: {reason})");
    }
    let use_grounding = state.config.chat.use_grounding && !no_rag;

    let store = state.conversation_store().await?;
    let conversation = store
        .create_conversation(title.as_deref().unwrap_or("New chat"))
        .await?;
    println!(
        "Conversation {} started. Type /quit to leave, /sources to list the last sources.",
        conversation.id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut last_reply: Option<ChatReply> = None;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/sources" => {
                match &last_reply {
                    Some(reply) => print_sources(reply),
                    None => println!("No answer yet."),
                }
                continue;
            }
            _ => {}
        }

        match exchange(&chat, store.as_ref(), conversation.id, input, use_grounding).await {
            Ok(reply) => {
                println!("{}\n", reply.text);
                last_reply = Some(reply);
            }
            Err(e) => {
                warn!("Turn failed: {e:#}");
                println!("(error: {e:#})\n");
            }
        }
    }

    Ok(())
}

/// List stored conversations, newest first
pub async fn conversations(state: &AppState) -> anyhow::Result<()> {
    let store = state.conversation_store().await?;
    let conversations = store.list_conversations().await?;
    if conversations.is_empty() {
        println!("No conversations.");
    }
    for conversation in conversations {
        println!(
            "{:>5}  {}  {}",
            conversation.id,
            conversation.created_at.format("%Y-%m-%d %H:%M"),
            conversation.title
        );
    }
    Ok(())
}

/// Print the turns of one conversation
pub async fn history(state: &AppState, id: i64) -> anyhow::Result<()> {
    let store = state.conversation_store().await?;
    let conversation = store
        .get_conversation(id)
        .await?
        .with_context(|| format!("Conversation {id} not found"))?;

    println!("# {}", conversation.title);
    for stored in store.history(id).await? {
        let audio = stored
            .audio_path
            .map(|p| format!(" [audio: {p}]"))
            .unwrap_or_default();
        println!("{}{audio}: {}", stored.turn.role, stored.turn.content);
    }
    Ok(())
}

/// One persisted question/answer exchange.
///
/// The user turn is stored before the model is called, so a failed call
/// still leaves the question in the log.
async fn exchange(
    chat: &ChatOrchestrator,
    store: &dyn ConversationStore,
    conversation_id: i64,
    question: &str,
    use_grounding: bool,
) -> anyhow::Result<ChatReply> {
    let history = store.turns(conversation_id).await?;
    store
        .append_turn(conversation_id, &ConversationTurn::user(question), None)
        .await?;

    let reply = chat
        .respond_detailed(question, &history, use_grounding)
        .await?;

    store
        .append_turn(
            conversation_id,
            &ConversationTurn::assistant(reply.text.clone()),
            None,
        )
        .await?;
    Ok(reply)
}

fn print_results(results: &[SearchResult]) {
    for (i, result) in results.iter().enumerate() {
        println!(
            "[{}] {:.3} {}#{}",
            i + 1,
            result.score,
            result.metadata.source,
            result.metadata.chunk_id
        );
        println!("    {}", preview(&result.chunk_text, 160));
    }
}

fn print_sources(reply: &ChatReply) {
    if reply.sources.is_empty() {
        println!("(no retrieved context)");
        return;
    }
    println!("\nSources:");
    for (i, source) in reply.sources.iter().enumerate() {
        let marker = if reply.cited.contains(&(i + 1)) { "*" } else { " " };
        println!(
            "{marker}[{}] {} (score {:.3})",
            i + 1,
            source.metadata.source,
            source.score
        );
    }
}

/// First `max_chars` characters on a single line
fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
