use serde::Serialize;
use serde_json::Value;

use crate::config::{McpServerConfig, UserLocation, WebSearchConfig};
use crate::providers::shared::{ChatContentBlock, ChatMessage, MessageContent, Role};
use crate::tools::ToolDefinition;

// === API Request Types ===

#[derive(Debug, Serialize)]
pub(crate) struct ThinkingConfig {
    #[serde(rename = "type")]
    thinking_type: &'static str,
    budget_tokens: u32,
}

impl ThinkingConfig {
    pub(crate) fn enabled(budget_tokens: u32) -> Self {
        Self {
            thinking_type: "enabled",
            budget_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamingMessagesRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    pub(crate) messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<ApiToolDef<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<Vec<SystemBlock<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) mcp_servers: Option<Vec<McpServerDef<'a>>>,
    pub(crate) stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SystemBlock<'a> {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

impl<'a> SystemBlock<'a> {
    pub(crate) fn with_cache_control(text: &'a str) -> Self {
        Self {
            block_type: "text",
            text,
            cache_control: Some(CacheControl::ephemeral()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheControl {
    #[serde(rename = "type")]
    cache_type: &'static str,
}

impl CacheControl {
    pub(crate) fn ephemeral() -> Self {
        Self {
            cache_type: "ephemeral",
        }
    }
}

/// Tool entry in the request: a local tool schema or a provider-hosted tool.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ApiToolDef<'a> {
    Custom {
        name: &'a str,
        description: &'a str,
        input_schema: &'a Value,
    },
    WebSearch(WebSearchToolDef<'a>),
}

impl<'a> From<&'a ToolDefinition> for ApiToolDef<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        ApiToolDef::Custom {
            name: &def.name,
            description: &def.description,
            input_schema: &def.input_schema,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WebSearchToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: &'static str,
    max_uses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_domains: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocked_domains: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_location: Option<&'a UserLocation>,
}

/// Remote MCP server entry for the provider's MCP connector.
#[derive(Debug, Serialize)]
pub(crate) struct McpServerDef<'a> {
    #[serde(rename = "type")]
    server_type: &'static str,
    url: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_token: Option<&'a str>,
}

impl<'a> From<&'a McpServerConfig> for McpServerDef<'a> {
    fn from(config: &'a McpServerConfig) -> Self {
        Self {
            server_type: "url",
            url: &config.url,
            name: &config.name,
            authorization_token: config.authorization_token.as_deref(),
        }
    }
}

pub(crate) const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
pub(crate) const WEB_SEARCH_TOOL_NAME: &str = "web_search";

impl<'a> From<&'a WebSearchConfig> for WebSearchToolDef<'a> {
    fn from(config: &'a WebSearchConfig) -> Self {
        Self {
            tool_type: WEB_SEARCH_TOOL_TYPE,
            name: WEB_SEARCH_TOOL_NAME,
            max_uses: config.max_uses,
            allowed_domains: config.allowed_domains.as_deref(),
            blocked_domains: config.blocked_domains.as_deref(),
            user_location: config.user_location.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage<'a> {
    pub(crate) role: Role,
    pub(crate) content: ApiMessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ApiMessageContent<'a> {
    Text(&'a str),
    Blocks(Vec<ApiContentBlock<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiContentBlock<'a> {
    Thinking {
        thinking: &'a str,
        signature: &'a str,
    },
    RedactedThinking {
        data: &'a str,
    },
    Text {
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a Value,
    },
    ServerToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a Value,
    },
    WebSearchToolResult {
        tool_use_id: &'a str,
        content: &'a Value,
    },
    ToolResult {
        tool_use_id: &'a str,
        content: &'a str,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl<'a> ApiMessage<'a> {
    /// Borrows a conversation message into request form.
    ///
    /// Thinking blocks without a signature (interrupted generation) cannot be
    /// verified by the provider and are left out; every other block is sent
    /// as stored.
    pub(crate) fn from_chat_message(msg: &'a ChatMessage) -> Self {
        let content = match &msg.content {
            MessageContent::Text(text) => ApiMessageContent::Text(text),
            MessageContent::Blocks(blocks) => {
                ApiMessageContent::Blocks(blocks.iter().filter_map(api_block).collect())
            }
        };
        ApiMessage {
            role: msg.role,
            content,
        }
    }
}

fn api_block(block: &ChatContentBlock) -> Option<ApiContentBlock<'_>> {
    let api = match block {
        ChatContentBlock::Thinking {
            thinking,
            signature,
        } => {
            if signature.is_empty() {
                return None;
            }
            ApiContentBlock::Thinking {
                thinking,
                signature,
            }
        }
        ChatContentBlock::RedactedThinking { data } => ApiContentBlock::RedactedThinking { data },
        ChatContentBlock::Text { text } => ApiContentBlock::Text {
            text,
            cache_control: None,
        },
        ChatContentBlock::ToolUse { id, name, input } => {
            ApiContentBlock::ToolUse { id, name, input }
        }
        ChatContentBlock::ServerToolUse { id, name, input } => {
            ApiContentBlock::ServerToolUse { id, name, input }
        }
        ChatContentBlock::WebSearchToolResult {
            tool_use_id,
            content,
        } => ApiContentBlock::WebSearchToolResult {
            tool_use_id,
            content,
        },
        ChatContentBlock::ToolResult(result) => ApiContentBlock::ToolResult {
            tool_use_id: &result.tool_use_id,
            content: &result.content,
            is_error: result.is_error,
            cache_control: None,
        },
    };
    Some(api)
}
