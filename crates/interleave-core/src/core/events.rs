//! Event types emitted by a turn.
//!
//! `StreamEvent` is the wire contract shared by the SSE and WebSocket
//! transports and decoded again by the client reassembler. Field names and
//! tags are stable; the `blockType` spelling is part of that contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::ProviderError;

/// Typed events a turn yields, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A provider content block opened; `block_type` is the provider's string.
    ContentBlockStart {
        #[serde(rename = "blockType")]
        block_type: String,
    },

    /// First fragment of a thinking block is about to follow.
    ThinkingStart,

    ThinkingDelta { content: String },

    /// First fragment of a text block is about to follow.
    ResponseStart,

    TextDelta { content: String },

    /// A local tool finished successfully.
    ToolResult {
        tool: String,
        input: Value,
        result: String,
    },

    /// A local tool failed, timed out, was rejected, or is not registered.
    ToolError { tool: String, error: String },

    /// The provider started a server-side tool (web search).
    WebSearchStart { tool: String, id: String },

    WebSearchQuery { query: String },

    /// Search results relayed verbatim from the provider.
    WebSearchResult { tool_use_id: String, content: Value },

    ContentBlockStop,
}

/// Outcome of a local tool handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Success { text: String },
    Failure { code: String, message: String },
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        ToolOutput::Success { text: text.into() }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        ToolOutput::Failure {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutput::Success { .. })
    }

    /// Result text on success, error message on failure.
    pub fn text(&self) -> &str {
        match self {
            ToolOutput::Success { text } => text,
            ToolOutput::Failure { message, .. } => message,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            ToolOutput::Success { .. } => None,
            ToolOutput::Failure { code, .. } => Some(code),
        }
    }
}

/// User-visible text for a provider overload.
pub const OVERLOADED_MESSAGE: &str = "Service Temporarily Overloaded. The model provider is \
     receiving too many requests right now. Please try again in a few moments.";

/// Terminal failure of a turn.
#[derive(Debug, Clone)]
pub enum TurnError {
    Provider(ProviderError),
    /// The model kept requesting tools past the configured round limit.
    ToolLoopLimit { rounds: usize },
    /// The client went away.
    Cancelled,
    /// Request construction or other local failure.
    Internal(String),
}

impl TurnError {
    /// Converts an error from the provider client, keeping provider
    /// classification when present.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<ProviderError>() {
            Ok(provider) => TurnError::Provider(provider),
            Err(other) => TurnError::Internal(format!("{other:#}")),
        }
    }

    /// Message suitable for an `error` frame.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::Provider(e) if e.is_overloaded() => OVERLOADED_MESSAGE.to_string(),
            TurnError::Provider(e) => format!("Request failed: {}", e.message),
            TurnError::ToolLoopLimit { rounds } => {
                format!("Tool-loop limit reached after {rounds} rounds")
            }
            TurnError::Cancelled => "Request cancelled".to_string(),
            TurnError::Internal(msg) => format!("Request failed: {msg}"),
        }
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Provider(e) => write!(f, "provider error ({}): {}", e.kind, e.message),
            TurnError::ToolLoopLimit { rounds } => {
                write!(f, "tool-loop limit reached after {rounds} rounds")
            }
            TurnError::Cancelled => write!(f, "turn cancelled"),
            TurnError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TurnError {}

impl From<ProviderError> for TurnError {
    fn from(e: ProviderError) -> Self {
        TurnError::Provider(e)
    }
}
