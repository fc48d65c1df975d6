use std::sync::{Arc, Mutex};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use secrecy::ExposeSecret;

use avatar_chat_types::chat::{ChatCompletionRequest, ChatCompletionResponse};
use avatar_chat_types::ChatMessage;

use crate::config::ChatConfig;
use crate::consts::CHAT_COMPLETIONS_PATH;
use crate::error::Result;

mod stats;

pub use stats::Stats;

/// A language model that answers a conversation with one message.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `Ok(None)` means the service answered but gave no usable reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<ChatMessage>>;
}

pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
    stats: Arc<Mutex<Stats>>,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http: reqwest::Client, config: ChatConfig) -> Self {
        Self {
            http,
            config,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, response: Option<&ChatCompletionResponse>) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_request();
            if let Some(usage) = response.and_then(|r| r.usage.as_ref()) {
                stats.update_usage(usage);
                tracing::debug!(
                    "total_tokens: {}, prompt_tokens: {}, completion_tokens: {}",
                    usage.total_tokens,
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
            }
        } else {
            tracing::error!("failed to update stats");
        }
    }
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<ChatMessage>> {
        let body = ChatCompletionRequest::new(self.config.model(), self.config.temperature(), messages.to_vec());
        let url = format!("{}{}", self.config.base_url(), CHAT_COMPLETIONS_PATH);

        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.api_key().expose_secret())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!("chat completion failed with status {}: {}", status, text);
            self.record(None);
            return Ok(None);
        }

        let parsed = match serde_json::from_str::<ChatCompletionResponse>(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("failed to deserialize chat completion: {}, text=> {:?}", e, text);
                self.record(None);
                return Ok(None);
            }
        };
        self.record(Some(&parsed));

        let reply = parsed.into_reply();
        if reply.is_none() {
            tracing::warn!("chat completion carried no choices");
        }
        Ok(reply)
    }
}
