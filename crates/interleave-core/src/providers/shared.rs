//! Provider-facing types: conversation messages, stream events and errors.

use std::fmt;

use anyhow::{Context, Result};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResult;

/// User-Agent header sent with provider requests.
pub const USER_AGENT: &str = concat!("interleave/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Config resolution helpers
// ============================================================================

/// Resolves an API key with precedence: config > env.
///
/// # Errors
/// Returns an error if neither the config value nor `env_var` is set.
pub fn resolve_api_key(
    config_api_key: Option<&str>,
    env_var: &str,
    config_section: &str,
) -> Result<String> {
    if let Some(key) = config_api_key {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    std::env::var(env_var).context(format!(
        "No API key available. Set {env_var} or api_key in [providers.{config_section}]."
    ))
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL does not parse.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    provider_name: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(default_url.to_string())
}

fn validate_url(url: &str, provider_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {provider_name} base URL: {url}"))?;
    Ok(())
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block in a conversation message.
///
/// Thinking signatures, redacted thinking data and web search results are
/// opaque provider data. They are stored as received and sent back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentBlock {
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ServerToolUse {
        id: String,
        name: String,
        input: Value,
    },
    WebSearchToolResult {
        tool_use_id: String,
        content: Value,
    },
    ToolResult(ToolResult),
}

/// Message content: either plain text or structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ChatContentBlock>),
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates an assistant message from finalized content blocks.
    pub fn assistant_blocks(blocks: Vec<ChatContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Creates the synthetic user message carrying tool results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let blocks = results
            .into_iter()
            .map(ChatContentBlock::ToolResult)
            .collect();
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Concatenated text of the message (text blocks only).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ChatContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Categories of provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection or request timeout
    Timeout,
    /// Invalid SSE or JSON from the provider
    Parse,
    /// Provider reported it is overloaded (HTTP 529 or `overloaded_error`)
    Overloaded,
    /// Other API-level error event (e.g. `rate_limit_error`)
    ApiError,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::HttpStatus => write!(f, "http_status"),
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::Parse => write!(f, "parse"),
            ProviderErrorKind::Overloaded => write!(f, "overloaded"),
            ProviderErrorKind::ApiError => write!(f, "api_error"),
        }
    }
}

/// Structured error from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// One-line summary
    pub message: String,
    /// Raw error body, when there is one
    pub details: Option<String>,
}

const OVERLOADED_STATUS: u16 = 529;

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, extracting `error.message` from a JSON body.
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = if status == OVERLOADED_STATUS || body.contains("overloaded_error") {
            ProviderErrorKind::Overloaded
        } else {
            ProviderErrorKind::HttpStatus
        };
        let details = (!body.is_empty()).then(|| body.to_string());

        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(msg) = json
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        {
            return Self {
                kind,
                message: format!("HTTP {status}: {msg}"),
                details,
            };
        }

        Self {
            kind,
            message: format!("HTTP {status}"),
            details,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    /// Creates an error from a mid-stream `error` event.
    pub fn api_error(error_type: &str, message: &str) -> Self {
        let kind = if error_type == "overloaded_error" {
            ProviderErrorKind::Overloaded
        } else {
            ProviderErrorKind::ApiError
        };
        Self {
            kind,
            message: format!("{error_type}: {message}"),
            details: None,
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.kind == ProviderErrorKind::Overloaded
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

/// Block header delivered with `content_block_start`.
#[derive(Debug, Clone, PartialEq)]
pub enum StartedBlock {
    Text,
    Thinking,
    /// Redacted thinking arrives whole; `data` is opaque.
    RedactedThinking { data: String },
    ToolUse { id: String, name: String },
    ServerToolUse { id: String, name: String },
    /// Provider-side search result, delivered whole at block start.
    WebSearchToolResult { tool_use_id: String, content: Value },
    /// A block kind this crate does not interpret.
    Other { block_type: String },
}

impl StartedBlock {
    /// The provider's type string for this block.
    pub fn block_type(&self) -> &str {
        match self {
            StartedBlock::Text => "text",
            StartedBlock::Thinking => "thinking",
            StartedBlock::RedactedThinking { .. } => "redacted_thinking",
            StartedBlock::ToolUse { .. } => "tool_use",
            StartedBlock::ServerToolUse { .. } => "server_tool_use",
            StartedBlock::WebSearchToolResult { .. } => "web_search_tool_result",
            StartedBlock::Other { block_type } => block_type,
        }
    }
}

/// Low-level events decoded from the provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    MessageStart { model: String, usage: Usage },
    ContentBlockStart { index: usize, block: StartedBlock },
    TextDelta { index: usize, text: String },
    InputJsonDelta { index: usize, partial_json: String },
    ThinkingDelta { index: usize, thinking: String },
    SignatureDelta { index: usize, signature: String },
    ContentBlockStop { index: usize },
    MessageDelta {
        stop_reason: Option<String>,
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    /// An event or delta type this client does not handle; skipped.
    Ignored { kind: String },
    Error { error_type: String, message: String },
}

/// Boxed stream of provider events.
pub type ProviderStream = BoxStream<'static, ProviderResult<ProviderEvent>>;
