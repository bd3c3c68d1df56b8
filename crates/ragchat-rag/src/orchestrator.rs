//! Chat orchestration: optional retrieval, prompt assembly and the model call
//!
//! The orchestrator answers one user turn at a time. It never writes to the
//! conversation store; callers persist turns themselves.
//!
//! Author: hephaex@gmail.com

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use ragchat_core::{ChatConfig, ChatError, ConversationTurn, LlmClient, Result, SearchResult, Transcriber};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::prompt::PromptAssembler;
use crate::retriever::RetrieverState;

/// A reply together with the context it was grounded on
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Assistant reply text
    pub text: String,

    /// Chunks placed in the prompt, in rank order
    pub sources: Vec<SearchResult>,

    /// 1-based ranks the reply cites with `[n]` markers
    pub cited: Vec<usize>,

    /// Whether the prompt carried retrieved context
    pub grounded: bool,
}

impl ChatReply {
    /// Sources the reply actually cites
    pub fn cited_sources(&self) -> impl Iterator<Item = &SearchResult> {
        self.cited
            .iter()
            .filter_map(|&rank| self.sources.get(rank.checked_sub(1)?))
    }
}

/// Reply to a spoken turn
#[derive(Debug, Clone)]
pub struct SpokenReply {
    /// Recognised text; empty when no speech was detected
    pub transcript: String,

    /// Assistant reply text
    pub reply: String,
}

impl SpokenReply {
    /// Text stored for the user turn when nothing was recognised
    pub const NO_SPEECH: &'static str = "(no speech)";

    /// User turn to persist for this exchange
    pub fn user_turn(&self) -> ConversationTurn {
        if self.transcript.is_empty() {
            ConversationTurn::user(Self::NO_SPEECH)
        } else {
            ConversationTurn::user(self.transcript.clone())
        }
    }

    /// Assistant turn to persist for this exchange
    pub fn assistant_turn(&self) -> ConversationTurn {
        ConversationTurn::assistant(self.reply.clone())
    }
}

/// Grounded chat orchestrator
pub struct ChatOrchestrator {
    retriever: RetrieverState,
    llm: Arc<dyn LlmClient>,
    assembler: PromptAssembler,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    /// Create a new orchestrator
    pub fn new(retriever: RetrieverState, llm: Arc<dyn LlmClient>, config: ChatConfig) -> Self {
        Self {
            retriever,
            llm,
            assembler: PromptAssembler::new(),
            transcriber: None,
            config,
        }
    }

    /// Use a custom prompt assembler
    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Set the speech-to-text engine used by [`Self::respond_to_speech`]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn retriever(&self) -> &RetrieverState {
        &self.retriever
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Answer `user_text` given the prior turns of the conversation.
    ///
    /// `history` must not contain the turn being answered.
    pub async fn respond(
        &self,
        user_text: &str,
        history: &[ConversationTurn],
        use_grounding: bool,
    ) -> Result<String> {
        Ok(self
            .respond_detailed(user_text, history, use_grounding)
            .await?
            .text)
    }

    /// Like [`Self::respond`], also returning the retrieved sources and the
    /// ranks the reply cites
    pub async fn respond_detailed(
        &self,
        user_text: &str,
        history: &[ConversationTurn],
        use_grounding: bool,
    ) -> Result<ChatReply> {
        let start_time = Instant::now();

        let (prompt, sources) = self.build_prompt(user_text, use_grounding).await;
        let grounded = sources.is_some();
        let sources = sources.unwrap_or_default();
        let history = self.bounded_history(history);

        info!(
            "Calling LLM {}: prompt {} chars, {} history turns, grounded={}",
            self.llm.model(),
            prompt.len(),
            history.len(),
            grounded
        );
        let text = self.llm.chat(&prompt, history).await?;
        let cited = extract_citations(&text, sources.len());

        info!(
            "LLM reply received: {} chars in {} ms",
            text.len(),
            start_time.elapsed().as_millis()
        );

        Ok(ChatReply {
            text,
            sources,
            cited,
            grounded,
        })
    }

    /// Transcribe `audio` and answer the transcript.
    ///
    /// A failed transcription counts as no speech, which is answered with
    /// the empty-input placeholder.
    pub async fn respond_to_speech(
        &self,
        audio: &Path,
        history: &[ConversationTurn],
        use_grounding: bool,
    ) -> Result<SpokenReply> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| ChatError::Config("No speech transcriber configured".to_string()))?;

        let transcript = match transcriber.transcribe(audio).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("Transcription of {} failed: {e}", audio.display());
                String::new()
            }
        };
        debug!("Transcript: {} chars", transcript.len());

        let reply = self.respond(&transcript, history, use_grounding).await?;
        Ok(SpokenReply { transcript, reply })
    }

    /// Final prompt plus the results it was grounded on, `None` when the
    /// prompt is ungrounded
    async fn build_prompt(
        &self,
        user_text: &str,
        use_grounding: bool,
    ) -> (String, Option<Vec<SearchResult>>) {
        if user_text.trim().is_empty() {
            return (self.config.empty_input_prompt.clone(), None);
        }

        if use_grounding {
            match &self.retriever {
                RetrieverState::Available(retriever) => {
                    match retriever.search(user_text, self.config.top_k).await {
                        Ok(results) => {
                            debug!("Grounding prompt with {} chunks", results.len());
                            let prompt = self.assembler.assemble(user_text, &results);
                            return (prompt, Some(results));
                        }
                        Err(e) => warn!("Retrieval failed, answering without context: {e}"),
                    }
                }
                RetrieverState::Unavailable(reason) => {
                    debug!("Retrieval unavailable: {reason}");
                }
            }
        }

        (user_text.to_string(), None)
    }

    fn bounded_history<'a>(&self, history: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        let keep = self.config.max_history_turns.min(history.len());
        &history[history.len() - keep..]
    }
}

fn citation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[(\d+)\]").ok())
        .as_ref()
}

/// Distinct `[n]` markers in `answer` that name one of `source_count` sources
fn extract_citations(answer: &str, source_count: usize) -> Vec<usize> {
    let Some(pattern) = citation_pattern() else {
        return Vec::new();
    };

    let mut cited: Vec<usize> = pattern
        .captures_iter(answer)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= source_count)
        .collect();
    cited.sort_unstable();
    cited.dedup();
    cited
}
