//! Request building and transport for the Anthropic client.

use anyhow::Result;

use super::sse::SseParser;
use super::types::{
    ApiContentBlock, ApiMessage, ApiMessageContent, ApiToolDef, CacheControl, McpServerDef,
    StreamingMessagesRequest, SystemBlock, ThinkingConfig, WebSearchToolDef,
};
use crate::config::{McpServerConfig, WebSearchConfig};
use crate::providers::shared::{
    ChatMessage, ProviderError, ProviderErrorKind, ProviderStream, Role, USER_AGENT,
};
use crate::tools::ToolDefinition;

pub(crate) fn build_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
    let mut api_messages: Vec<ApiMessage<'_>> =
        messages.iter().map(ApiMessage::from_chat_message).collect();
    apply_cache_control_to_last_user_block(&mut api_messages);
    api_messages
}

pub(crate) fn build_tool_defs<'a>(
    tools: &'a [ToolDefinition],
    web_search: Option<&'a WebSearchConfig>,
) -> Option<Vec<ApiToolDef<'a>>> {
    let mut defs: Vec<ApiToolDef<'a>> = tools.iter().map(ApiToolDef::from).collect();
    if let Some(config) = web_search {
        defs.push(ApiToolDef::WebSearch(WebSearchToolDef::from(config)));
    }
    (!defs.is_empty()).then_some(defs)
}

pub(crate) fn build_mcp_servers(servers: &[McpServerConfig]) -> Option<Vec<McpServerDef<'_>>> {
    (!servers.is_empty()).then(|| servers.iter().map(McpServerDef::from).collect())
}

pub(crate) fn build_thinking_config(thinking_budget: u32) -> Option<ThinkingConfig> {
    (thinking_budget > 0).then(|| ThinkingConfig::enabled(thinking_budget))
}

pub(crate) fn build_system_blocks(prompt: Option<&str>) -> Option<Vec<SystemBlock<'_>>> {
    prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| vec![SystemBlock::with_cache_control(p)])
}

/// Posts the request and returns the decoded event stream.
///
/// # Errors
/// Returns a [`ProviderError`] (wrapped in `anyhow`) for transport failures
/// and non-success statuses.
pub(crate) async fn send_streaming_request(
    client: &reqwest::Client,
    url: &str,
    request: &StreamingMessagesRequest<'_>,
    header_fn: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
) -> Result<ProviderStream> {
    let builder = client
        .post(url)
        .header("content-type", "application/json")
        .header("accept", "text/event-stream")
        .header("user-agent", USER_AGENT);

    let response = header_fn(builder.json(request))
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http_status(status.as_u16(), &error_body).into());
    }

    Ok(Box::pin(SseParser::new(Box::pin(response.bytes_stream()))))
}

fn apply_cache_control_to_last_user_block(api_messages: &mut [ApiMessage<'_>]) {
    if let Some(last_user_msg) = api_messages.iter_mut().rev().find(|m| m.role == Role::User)
        && let ApiMessageContent::Blocks(blocks) = &mut last_user_msg.content
        && let Some(last_block) = blocks.last_mut()
    {
        match last_block {
            ApiContentBlock::Text { cache_control, .. }
            | ApiContentBlock::ToolResult { cache_control, .. } => {
                *cache_control = Some(CacheControl::ephemeral());
            }
            _ => {}
        }
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::timeout(format!("Connection failed: {e}"))
    } else if e.is_request() {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Request error: {e}"))
    } else {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Network error: {e}"))
    }
}
