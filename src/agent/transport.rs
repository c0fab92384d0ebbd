//! Transport boundary for the copilot
//!
//! The transport produces a stream of `TransportMessage`s for one prompt. The
//! message shapes are externally defined and evolve over time, so they are
//! modeled as a closed sum type here with a single classification function
//! mapping them onto [`AgentEvent`]s. Anything the mapping does not recognize
//! is dropped, not raised.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use super::events::AgentEvent;

/// Options for one conversational turn.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// System directive embedding cluster/context/namespace
    pub system_prompt: String,
    /// Capability allow-list; this application permits exactly one tool
    pub allowed_tools: Vec<String>,
    /// Upper bound on request/response rounds within the turn
    pub max_turns: usize,
    /// Model override, transport default when `None`
    pub model: Option<String>,
}

/// One message from the transport's stream.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// Assistant output: text, thinking, and tool invocations in order
    Assistant { content: Vec<ContentBlock> },
    /// User-role message carrying tool results back to the model
    User { content: Vec<ContentBlock> },
    /// Terminal summary for the turn
    Result {
        is_error: bool,
        summary: Option<String>,
    },
    /// Transport housekeeping, carries nothing the UI needs
    System,
}

/// A block within an assistant or user message.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// Produces the message stream for one prompt.
///
/// Implementations own the conversation with the model, including any
/// internal tool-execution rounds; the engine only consumes messages.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn stream(
        &self,
        prompt: &str,
        options: &TurnOptions,
    ) -> Result<BoxStream<'static, Result<TransportMessage>>>;
}

/// Maps one transport message onto zero or more agent events.
///
/// This is the single source of truth for the mapping: assistant blocks
/// become text/thinking/tool_use in content order, user blocks become
/// tool_result, an error-flagged result becomes one error event, and every
/// other shape maps to nothing.
pub fn classify(msg: &TransportMessage) -> Vec<AgentEvent> {
    match msg {
        TransportMessage::Assistant { content } => content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(AgentEvent::Text { body: text.clone() }),
                ContentBlock::Thinking { thinking } => Some(AgentEvent::Thinking {
                    body: thinking.clone(),
                }),
                ContentBlock::ToolUse { id, name, input } => Some(AgentEvent::ToolUse {
                    tool_name: name.clone(),
                    tool_input: render_tool_input(input),
                    tool_id: id.clone(),
                }),
                other => {
                    tracing::debug!(?other, "dropping unexpected assistant block");
                    None
                }
            })
            .collect(),
        TransportMessage::User { content } => content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(AgentEvent::ToolResult {
                    tool_id: tool_use_id.clone(),
                    body: content.clone(),
                    is_error: *is_error,
                }),
                other => {
                    tracing::debug!(?other, "dropping unexpected user block");
                    None
                }
            })
            .collect(),
        TransportMessage::Result { is_error, summary } => {
            if *is_error {
                vec![AgentEvent::Error {
                    body: summary.clone().unwrap_or_else(|| "Unknown error".to_string()),
                }]
            } else {
                Vec::new()
            }
        }
        TransportMessage::System => Vec::new(),
    }
}

/// Pretty-prints tool input for display in a narrow panel.
fn render_tool_input(input: &Value) -> String {
    if input.is_null() {
        return String::new();
    }
    serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string())
}
