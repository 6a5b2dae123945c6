//! Model provider client and the stream types it produces.

pub mod anthropic;
pub mod shared;

use anyhow::Result;
use futures_util::future::BoxFuture;

pub use shared::{
    ChatContentBlock, ChatMessage, MessageContent, ProviderError, ProviderErrorKind,
    ProviderEvent, ProviderResult, ProviderStream, Role, StartedBlock, Usage, resolve_api_key,
    resolve_base_url,
};

use crate::config::{GenerationSettings, McpServerConfig, WebSearchConfig};
use crate::tools::ToolDefinition;

/// Everything one generation phase sends to the provider.
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
    /// Provider-hosted web search, when enabled.
    pub web_search: Option<&'a WebSearchConfig>,
    /// Remote MCP servers the provider should connect to.
    pub mcp_servers: &'a [McpServerConfig],
    pub system: Option<&'a str>,
    pub settings: &'a GenerationSettings,
}

/// A streaming model provider.
pub trait ModelProvider: Send + Sync {
    /// Opens a provider stream for one generation phase.
    fn stream<'a>(&'a self, request: StreamRequest<'a>) -> BoxFuture<'a, Result<ProviderStream>>;
}
