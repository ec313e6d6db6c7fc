//! Minimal Anthropic Messages API client.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::AssistantConfig;
use crate::storage::ChatMessage;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &AssistantConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AssistantConfig) -> Result<Option<Self>> {
        match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Some(Self::new(config, key)?)),
            _ => Ok(None),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.model
    }

    /// Ask for a complete reply and return its first text block.
    pub async fn send_message(
        &self,
        history: &[ChatMessage],
        prompt: &str,
        model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let resp = self.post(history, prompt, model, max_tokens, false).await?;
        let parsed: MessagesResponse = resp.json().await.context("failed to parse Anthropic response")?;
        Ok(parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .unwrap_or_default())
    }

    /// Open a streaming request. The caller consumes the SSE body.
    pub async fn request_stream(
        &self,
        history: &[ChatMessage],
        prompt: &str,
        model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<reqwest::Response> {
        self.post(history, prompt, model, max_tokens, true).await
    }

    async fn post(
        &self,
        history: &[ChatMessage],
        prompt: &str,
        model: Option<&str>,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = MessagesRequest {
            model: model.unwrap_or(&self.model),
            max_tokens: max_tokens.unwrap_or(self.max_tokens),
            messages: build_messages(history, prompt),
            stream: stream.then_some(true),
        };
        debug!(model = body.model, messages = body.messages.len(), stream, "anthropic request");

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%status, "anthropic error: {text}");
            bail!("anthropic returned {status}");
        }
        Ok(resp)
    }
}

/// Turn stored history plus the new prompt into an API message list.
///
/// Only `user` and `assistant` turns are sent. Consecutive turns of the same
/// role are merged and leading assistant turns dropped, since the API
/// requires alternating roles starting with `user`.
pub fn build_messages(history: &[ChatMessage], prompt: &str) -> Vec<ApiMessage> {
    let turns = history
        .iter()
        .map(|m| (m.role.as_str(), m.content.as_str()))
        .chain(std::iter::once(("user", prompt)))
        .filter(|(role, content)| matches!(*role, "user" | "assistant") && !content.trim().is_empty());

    let mut messages: Vec<ApiMessage> = Vec::new();
    for (role, content) in turns {
        if let Some(last) = messages.last_mut().filter(|last| last.role == role) {
            last.content.push_str("\n\n");
            last.content.push_str(content);
        } else if !(messages.is_empty() && role == "assistant") {
            messages.push(ApiMessage {
                role: role.to_string(),
                content: content.to_string(),
            });
        }
    }
    messages
}
