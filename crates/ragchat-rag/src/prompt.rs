//! Grounded prompt assembly

use ragchat_core::SearchResult;

/// Instruction line placed before the retrieved context
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer using the provided context if relevant; if not found, say you don't have enough information. Keep answers concise.\n";

/// Builds the single prompt string sent to the model
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system: String,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the instruction text
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Numbered context entries joined by blank lines.
    ///
    /// Each entry is `[rank] (score S src:SOURCE)` followed by the chunk
    /// text, with the score rounded to three decimals.
    pub fn format_context(retrieved: &[SearchResult]) -> String {
        retrieved
            .iter()
            .enumerate()
            .map(|(i, result)| {
                format!(
                    "[{}] (score {} src:{})\n{}",
                    i + 1,
                    rounded_score(result.score),
                    result.metadata.source,
                    result.chunk_text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Instruction, context block and user text as one prompt
    pub fn assemble(&self, user_text: &str, retrieved: &[SearchResult]) -> String {
        format!(
            "{}\nContext:\n{}\n\nUser:\n{}",
            self.system,
            Self::format_context(retrieved),
            user_text
        )
    }
}

/// Score rounded to three decimals in its shortest form (`0.5`, `1.0`, `0.912`)
fn rounded_score(score: f32) -> String {
    let rounded = (f64::from(score) * 1000.0).round() / 1000.0;
    format!("{rounded:?}")
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::ChunkMetadata;

    fn result(text: &str, source: &str, score: f32) -> SearchResult {
        SearchResult::new(text, ChunkMetadata::new(source, 0), score)
    }

    #[test]
    fn test_grounded_prompt_layout() {
        let prompt = PromptAssembler::new().assemble(
            "How long do refunds take?",
            &[
                result("Refunds are processed within 30 days.", "policy.txt", 0.9123),
                result("Contact support for help.", "faq.md", 0.5),
            ],
        );

        let expected = format!(
            "{DEFAULT_SYSTEM_PROMPT}\nContext:\n\
             [1] (score 0.912 src:policy.txt)\nRefunds are processed within 30 days.\n\n\
             [2] (score 0.5 src:faq.md)\nContact support for help.\n\n\
             User:\nHow long do refunds take?"
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_score_rounding() {
        assert_eq!(rounded_score(0.9123), "0.912");
        assert_eq!(rounded_score(0.5), "0.5");
        assert_eq!(rounded_score(1.0), "1.0");
        assert_eq!(rounded_score(0.99951), "1.0");
        assert_eq!(rounded_score(0.0004), "0.0");
        assert_eq!(rounded_score(-0.25), "-0.25");
    }

    #[test]
    fn test_empty_context_keeps_headers() {
        let prompt = PromptAssembler::new().assemble("Hello", &[]);
        assert!(prompt.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.ends_with("\nContext:\n\n\nUser:\nHello"));
    }

    #[test]
    fn test_custom_system_text() {
        let prompt = PromptAssembler::new()
            .with_system("Answer in one word.\n")
            .assemble("Ping?", &[]);
        assert!(prompt.starts_with("Answer in one word.\n\nContext:\n"));
    }
}
