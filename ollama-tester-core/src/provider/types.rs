//! Common types for the model-server boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when talking to the model server.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// HTTP API of a model server.
///
/// Implemented by [`OllamaProvider`](super::OllamaProvider); tests swap in
/// in-memory fakes.
#[async_trait]
pub trait ModelServer: Send + Sync {
    /// Short-timeout liveness probe. Never fails: any transport error is `false`.
    async fn probe(&self) -> bool;

    /// Identifiers of the locally installed models.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Install a model through the server, reporting progress per event.
    async fn pull<'a>(
        &'a self,
        model: &str,
        progress: Box<dyn FnMut(PullProgress) + Send + 'a>,
    ) -> Result<()>;

    /// Non-streaming chat completion. Returns the full JSON reply.
    async fn chat(&self, request: &ChatRequest) -> Result<serde_json::Value>;
}

/// Role of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        };
        f.write_str(name)
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options sent with every chat request.
///
/// `num_predict = -1` means "no limit" and is sent as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub repeat_penalty: f64,
    pub num_predict: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            num_predict: -1,
            seed: None,
        }
    }
}

/// What the caller wants back from a chat request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Only `message.content`.
    #[default]
    Text,
    /// The whole reply, pretty-printed.
    Json,
}

/// Request payload for the chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: SamplingOptions,
    pub stream: bool,

    #[serde(skip)]
    pub output: OutputMode,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: SamplingOptions::default(),
            stream: false,
            output: OutputMode::Text,
        }
    }

    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

/// Result of a chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Text shown to the user and fed to the filter.
    pub text: String,
    /// Full reply, present in [`OutputMode::Json`].
    pub payload: Option<serde_json::Value>,
}

impl ChatResponse {
    /// Normalize a raw server reply according to the requested output mode.
    pub fn from_payload(payload: serde_json::Value, output: OutputMode) -> Result<Self> {
        match output {
            OutputMode::Json => Ok(Self {
                text: serde_json::to_string_pretty(&payload)?,
                payload: Some(payload),
            }),
            OutputMode::Text => {
                let text = payload
                    .pointer("/message/content")
                    .and_then(|content| content.as_str())
                    .ok_or_else(|| ProviderError::Malformed("missing message.content".to_string()))?
                    .to_string();
                Ok(Self { text, payload: None })
            }
        }
    }
}

/// One progress event of a model pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}
