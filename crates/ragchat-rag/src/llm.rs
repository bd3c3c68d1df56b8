//! LLM Client implementations
//!
//! Provides chat clients for the Ollama and OpenAI-compatible APIs. Both
//! send the prior conversation followed by the assembled prompt and wait
//! for a single non-streamed reply. Every failure is reported as a
//! [`LlmFailure`] so callers can tell it apart from retrieval problems.
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{ChatError, ConversationTurn, LlmClient, LlmConfig, LlmFailure, LlmProvider, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct Message {
    role: String,
    content: String,
}

/// Prior turns followed by the prompt as the final user message
fn build_messages(prompt: &str, history: &[ConversationTurn]) -> Vec<Message> {
    history
        .iter()
        .map(|turn| Message {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        })
        .chain(std::iter::once(Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }))
        .collect()
}

/// Request timeout used until a config or [`OllamaClient::with_timeout`] says otherwise
const DEFAULT_TIMEOUT_SECS: u64 = 120;

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ChatError::Config(format!("Failed to build HTTP client: {e}")))
}

fn transport_failure(e: reqwest::Error, timeout_secs: u64) -> LlmFailure {
    if e.is_timeout() {
        LlmFailure::Timeout(timeout_secs)
    } else {
        LlmFailure::Transport(e.to_string())
    }
}

/// Check the status and decode the body of a chat response
async fn read_reply<T: DeserializeOwned>(response: Response, timeout_secs: u64) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_failure(e, timeout_secs))?;

    if !status.is_success() {
        return Err(LlmFailure::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    serde_json::from_str(&body).map_err(|e| LlmFailure::Malformed(e.to_string()).into())
}

fn non_empty(reply: Option<String>) -> Result<String> {
    match reply {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmFailure::EmptyReply.into()),
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            max_tokens,
            temperature,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ChatError::Config("OpenAI API key required".to_string()))?;

        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Rebuild the HTTP client with a different request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = http_client(timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(self)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: build_messages(prompt, history),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            "OpenAI chat request: model={}, messages={}",
            self.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_failure(e, self.timeout_secs))?;

        let result: OpenAiResponse = read_reply(response, self.timeout_secs).await?;
        non_empty(result.choices.into_iter().next().map(|c| c.message.content))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama `/api/chat` client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<Message>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<Message>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.4,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.model.clone())?
            .with_timeout(config.timeout_secs)?;
        client.temperature = config.temperature;
        Ok(client)
    }

    /// Rebuild the HTTP client with a different request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self> {
        self.client = http_client(timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(self)
    }

    fn request(&self, prompt: &str, history: &[ConversationTurn]) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: build_messages(prompt, history),
            options: OllamaOptions {
                temperature: self.temperature,
            },
            stream: false,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, prompt: &str, history: &[ConversationTurn]) -> Result<String> {
        let request = self.request(prompt, history);
        debug!(
            "Ollama chat request: model={}, messages={}",
            self.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_failure(e, self.timeout_secs))?;

        let result: OllamaResponse = read_reply(response, self.timeout_secs).await?;
        non_empty(result.message.map(|m| m.content))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 2048, 0.1)
            .unwrap()
            .with_base_url("http://localhost:8000/v1/");
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(client.model(), "gemma3:1b");
        assert_eq!(client.base_url, "http://127.0.0.1:11434");
        assert_eq!(client.timeout_secs, 120);
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAI,
            ..Default::default()
        };
        assert!(matches!(create_llm_client(&config), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_ollama_request_payload() {
        let client = OllamaClient::new("http://localhost:11434", "gemma3:1b").unwrap();
        let history = vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello! How can I help?"),
        ];
        let request = client.request("What is the refund window?", &history);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gemma3:1b");
        assert_eq!(value["stream"], false);
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);

        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"], "What is the refund window?");
    }

    #[test]
    fn test_empty_reply_is_failure() {
        assert!(matches!(
            non_empty(Some("  \n".to_string())),
            Err(ChatError::Llm(LlmFailure::EmptyReply))
        ));
        assert!(matches!(
            non_empty(None),
            Err(ChatError::Llm(LlmFailure::EmptyReply))
        ));
        assert_eq!(non_empty(Some("ok".to_string())).unwrap(), "ok");
    }

    /// Address of a server that accepts connections and never answers
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let client = OllamaClient::new(silent_server().await, "gemma3:1b")
            .unwrap()
            .with_timeout(1)
            .unwrap();
        assert_eq!(client.timeout_secs, 1);

        let err = client.chat("hello", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Llm(LlmFailure::Timeout(1))));
    }

    #[test]
    fn test_new_clients_carry_default_timeout() {
        let ollama = OllamaClient::new("http://localhost:11434", "gemma3:1b").unwrap();
        assert_eq!(ollama.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let openai = OpenAiClient::new("test-key", "gpt-4o-mini", 256, 0.2)
            .unwrap()
            .with_timeout(30)
            .unwrap();
        assert_eq!(openai.timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_failure() {
        let client = OllamaClient::new("http://127.0.0.1:9", "gemma3:1b").unwrap();
        let err = client.chat("hello", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Llm(LlmFailure::Transport(_))));
    }
}
