//! Model provider boundary: conversation types and the client trait the
//! orchestration loop talks through.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One typed block of message content, mirroring the provider wire format.
/// Assistant blocks are echoed back into history verbatim so tool-use ids
/// stay paired with their results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Tool results travel as user turns carrying a `tool_result` block
    /// that echoes the request's correlation id.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(other)]
    Other,
}

/// Request sent to the model: accumulated conversation plus the full tool
/// catalogue.
#[derive(Debug)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {cause}")]
    Transport { cause: String, timeout: bool },

    #[error("model provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// Client for a hosted model with tool-use support.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_blocks_serialize_to_the_wire_format() {
        let block = ContentBlock::ToolUse {
            id: "toolu_01".into(),
            name: "get_latest_crypto_quotes".into(),
            input: json!({ "symbol": "ADA" }),
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({
                "type": "tool_use",
                "id": "toolu_01",
                "name": "get_latest_crypto_quotes",
                "input": { "symbol": "ADA" }
            })
        );

        let result = Message::tool_result("toolu_01", "done");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "role": "user",
                "content": [{ "type": "tool_result", "tool_use_id": "toolu_01", "content": "done" }]
            })
        );
    }

    #[test]
    fn unknown_stop_reason_deserializes_as_other() {
        let reason: StopReason = serde_json::from_str("\"pause_turn\"").unwrap();
        assert_eq!(reason, StopReason::Other);
        let reason: StopReason = serde_json::from_str("\"tool_use\"").unwrap();
        assert_eq!(reason, StopReason::ToolUse);
    }
}
