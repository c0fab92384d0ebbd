//! Typed events emitted while the copilot processes one turn
//!
//! Every consumer of the agent (the TUI transcript, the audit log, tests)
//! speaks this vocabulary. The variants are deliberately flat strings so they
//! can cross a channel or a serialization boundary without losing the
//! `tool_id` correlation or the `is_error` flag.

use serde::{Deserialize, Serialize};

/// A single unit of agent output for one turn.
///
/// `Done` is the turn's completion signal: it is emitted exactly once per
/// turn, always last, whether the turn finished, errored, or was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Assistant-visible natural-language output
    Text { body: String },
    /// Internal reasoning, advisory only
    Thinking { body: String },
    /// The assistant asked to invoke a tool
    ToolUse {
        tool_name: String,
        /// Tool input, pre-serialized for display
        tool_input: String,
        tool_id: String,
    },
    /// Outcome of a prior `ToolUse`, correlated by `tool_id`
    ToolResult {
        tool_id: String,
        body: String,
        is_error: bool,
    },
    /// The turn failed; `body` describes the failure
    Error { body: String },
    /// Terminal marker, exactly one per turn
    Done,
}

impl AgentEvent {
    /// True for the terminal marker.
    pub fn is_done(&self) -> bool {
        matches!(self, AgentEvent::Done)
    }
}
