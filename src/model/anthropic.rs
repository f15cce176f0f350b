//! Anthropic messages API client.

use super::{ContentBlock, Message, ModelClient, ModelError, ModelReply, ModelRequest, StopReason};
use crate::tools::ToolDefinition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesPayload<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build model provider HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let payload = MessagesPayload {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.filter(|s| !s.is_empty()),
            tools: request.tools,
            messages: request.messages,
        };

        debug!("Model request: {} messages, {} tools", request.messages.len(), request.tools.len());

        // A timeout here is fatal to the current turn; resubmitting the
        // prompt could duplicate a non-idempotent tool call.
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Transport {
                timeout: e.is_timeout(),
                cause: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        Ok(ModelReply {
            content: body.content,
            stop_reason: body.stop_reason,
        })
    }
}
