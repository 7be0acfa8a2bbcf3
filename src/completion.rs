use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{ChatMessage, CompletionError, LanguageModel, ModelRequest};
use crate::settings::{EffectiveSettings, ModelParams};

pub const SYSTEM_PROMPT: &str =
    "You are a talented writer, a skilled professional in detailed, lengthy and robust writing skills.";

/// How often and how patiently a transient failure is retried.
/// `max_attempts == 1` means a single try.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 2000, backoff_multiplier: 2 }
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier.max(1)).saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

/// Prompt/response history of one article. Never holds more than `window`
/// entries, and never sends more than that.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    window: usize,
}

impl Conversation {
    pub fn new(window: usize) -> Self {
        Self { messages: Vec::new(), window: window.max(1) }
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// History plus the new user turn, cut to the most recent `window` entries.
    fn window_with(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut turns: Vec<ChatMessage> = self.messages.clone();
        turns.push(ChatMessage::user(prompt));
        let excess = turns.len().saturating_sub(self.window);
        turns.split_off(excess)
    }

    fn record(&mut self, prompt: &str, reply: &str) {
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::assistant(reply));
        let excess = self.messages.len().saturating_sub(self.window);
        self.messages.drain(..excess);
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    model: Arc<dyn LanguageModel>,
    model_name: String,
    params: ModelParams,
    retry: RetryPolicy,
    window: usize,
}

impl CompletionClient {
    pub fn new(model: Arc<dyn LanguageModel>, settings: &EffectiveSettings) -> Self {
        Self {
            model,
            model_name: settings.model.clone(),
            params: settings.model_params.clone(),
            retry: settings.retry.clone(),
            window: settings.history_window,
        }
    }

    /// A conversation sized to this client's window.
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.window)
    }

    /// Sends `prompt` with the windowed history and records the exchange.
    /// A failed call leaves the conversation untouched.
    pub async fn complete(&self, conversation: &mut Conversation, prompt: &str) -> Result<String, CompletionError> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(conversation.window_with(prompt));

        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let req = ModelRequest {
                model: self.model_name.clone(),
                messages: messages.clone(),
                temperature: self.params.temperature,
                max_tokens: self.params.max_tokens,
                top_p: self.params.top_p,
            };
            metrics::counter!("completion_requests_total").increment(1);
            debug!(model = %self.model_name, attempt, history = messages.len() - 1, "sending completion request");
            match self.model.generate(req).await {
                Ok(resp) => {
                    conversation.record(prompt, &resp.content);
                    return Ok(resp.content);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    metrics::counter!("completion_failures_total", "kind" => "transient").increment(1);
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, max_attempts = attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying completion");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    let kind = if err.is_transient() { "transient" } else { "permanent" };
                    metrics::counter!("completion_failures_total", "kind" => kind).increment(1);
                    warn!(attempt, error = %err, "completion failed");
                    return Err(err);
                }
            }
        }
    }
}
