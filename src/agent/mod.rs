//! Orchestration loop: drives one bounded tool-use conversation.
//!
//! Each turn sends the accumulated conversation plus the full tool
//! catalogue to the model, classifies the reply as a final answer or a
//! tool request, executes at most one tool, folds the formatted result
//! back into the conversation, and repeats up to the turn bound.

pub mod formatter;

pub use formatter::FormatterMap;

use crate::dispatch::ToolExecutor;
use crate::model::{ContentBlock, Message, ModelClient, ModelRequest};
use crate::tools::ToolDefinition;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a session currently is in its turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingModel,
    AwaitingToolResult,
    Done,
}

/// Terminal result of a session. Exhausting the turn bound is a defined
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The model produced a final text answer.
    Completed { text: String, turns: u32 },
    /// The turn bound was reached before a final answer.
    Incomplete { turns: u32 },
    /// The caller cancelled the session mid-flight.
    Cancelled,
}

/// Session parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    /// Maximum model turns. Must be >= 1; the loop's only safety valve.
    pub max_turns: u32,
    pub max_tokens: u32,
}

/// One conversation session. Holds the tool catalogue and the strategy map
/// resolved at construction; mutated only by [`Session::run`].
pub struct Session {
    id: String,
    model: Arc<dyn ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    catalogue: Vec<ToolDefinition>,
    formatters: FormatterMap,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        model: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        catalogue: Vec<ToolDefinition>,
        formatters: FormatterMap,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            model,
            executor,
            catalogue,
            formatters,
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the session to a terminal outcome. Cancellation aborts the
    /// in-flight network call; the session writes no shared state, so a
    /// cancelled session is simply discarded.
    pub async fn run(&self, prompt: String, cancel: CancellationToken) -> Result<SessionOutcome> {
        info!("[Session {}] Starting ({} tools, turn bound {})", self.id, self.catalogue.len(), self.options.max_turns);

        let mut messages = vec![Message::user_text(prompt)];
        let mut state = SessionState::AwaitingModel;
        let mut turns: u32 = 0;

        loop {
            debug!("[Session {}] state={state:?} turn={}", self.id, turns + 1);
            let request = ModelRequest {
                system: self.options.system_prompt.as_deref(),
                messages: &messages,
                tools: &self.catalogue,
                max_tokens: self.options.max_tokens,
            };

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[Session {}] Cancelled while awaiting the model", self.id);
                    return Ok(SessionOutcome::Cancelled);
                }
                reply = self.model.complete(request) => reply?,
            };
            turns += 1;

            let text = reply
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");

            let requests: Vec<(&str, &str, &serde_json::Value)> = reply
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.as_str(), name.as_str(), input))
                    }
                    _ => None,
                })
                .collect();

            // Final answer: no tool requested.
            if requests.is_empty() {
                state = SessionState::Done;
                debug!("[Session {}] state={state:?}", self.id);
                info!("[Session {}] Completed after {} turn(s)", self.id, turns);
                return Ok(SessionOutcome::Completed { text, turns });
            }

            state = SessionState::AwaitingToolResult;
            debug!("[Session {}] state={state:?}", self.id);
            if !text.is_empty() {
                info!("[Session {}] Model: {}", self.id, preview(&text));
            }

            // Single-tool-call contract: only the first request is honored.
            if requests.len() > 1 {
                warn!(
                    "[Session {}] Model requested {} tools in one turn; honoring only '{}'",
                    self.id,
                    requests.len(),
                    requests[0].1
                );
            }
            let (tool_use_id, tool, arguments) = requests[0];
            info!("[Session {}] Tool: {}({})", self.id, tool, arguments);

            // The assistant turn is echoed verbatim so the provider can pair
            // the tool result with its correlation id.
            messages.push(Message::assistant(reply.content.clone()));

            let invocation = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[Session {}] Cancelled while awaiting a tool result", self.id);
                    return Ok(SessionOutcome::Cancelled);
                }
                result = self.executor.invoke(tool, arguments) => result,
            };

            let result_text = match &invocation {
                Ok(result) => {
                    let formatted = self.formatters.format_success(tool, arguments, result);
                    info!("[Session {}] Tool result: {} chars", self.id, formatted.len());
                    formatted
                }
                Err(error) => {
                    warn!("[Session {}] Tool error: {}", self.id, error);
                    self.formatters.format_failure(tool, error)
                }
            };
            messages.push(Message::tool_result(tool_use_id, result_text));
            state = SessionState::AwaitingModel;

            if turns >= self.options.max_turns {
                info!("[Session {}] Turn bound reached without a final answer", self.id);
                return Ok(SessionOutcome::Incomplete { turns });
            }
        }
    }
}

/// First 200 characters of the model's text for log lines. Cuts on a char
/// boundary; model text is arbitrary Unicode.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
