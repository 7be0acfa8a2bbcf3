use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
}

/// Failure of a single completion call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Rate limits, server errors, timeouts and dropped connections.
    #[error("transient completion failure: {0}")]
    Transient(String),
    /// Anything a retry will not fix: bad requests, auth, malformed or empty replies.
    #[error("completion failed: {0}")]
    Permanent(String),
}

impl CompletionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transient(_))
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            CompletionError::Transient(err.to_string())
        } else {
            CompletionError::Permanent(err.to_string())
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, req: ModelRequest) -> Result<ModelResponse, CompletionError>;
}

#[derive(Clone)]
pub struct OpenAICompatible {
    pub base_url: String,
    pub api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAICompatible {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { base_url: base_url.into(), api_key, client }
    }

    pub fn from_env(timeout: Duration) -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        Self::new(base_url, api_key, timeout)
    }
}

impl Default for OpenAICompatible {
    fn default() -> Self {
        Self::from_env(Duration::from_secs(crate::settings::DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")] temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")] max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")] top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OaiChoice { message: OaiMessage }

#[derive(Debug, Deserialize)]
struct OaiMessage { content: Option<String> }

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn generate(&self, req: ModelRequest) -> Result<ModelResponse, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = OaiChatRequest {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            top_p: req.top_p,
        };
        let mut rb = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await?;
        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CompletionError::Transient(format!("model call failed: {}", status)));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Permanent(format!("model call failed: {} {}", status, detail.trim())));
        }
        let v: OaiChatResponse = resp
            .json()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::from(e)
                } else {
                    CompletionError::Permanent(format!("malformed completion: {}", e))
                }
            })?;
        let content = v
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(CompletionError::Permanent("empty completion".into()));
        }
        let model = if v.model.is_empty() { req.model } else { v.model };
        Ok(ModelResponse { content, model })
    }
}
