//! Anthropic Messages API client (API key auth).

use anyhow::Result;
use futures_util::future::BoxFuture;

use super::shared::{
    build_api_messages, build_mcp_servers, build_system_blocks, build_thinking_config,
    build_tool_defs, send_streaming_request,
};
use super::types::StreamingMessagesRequest;
use crate::config::ProviderConfig;
use crate::providers::shared::{ProviderStream, resolve_api_key, resolve_base_url};
use crate::providers::{ModelProvider, StreamRequest};

/// Default base URL for the Anthropic API.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";
/// Sent only when extended thinking is on.
const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";
/// Sent only when MCP servers are configured.
const MCP_CLIENT_BETA: &str = "mcp-client-2025-04-04";

/// Connection settings for the Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
}

impl AnthropicConfig {
    /// Resolves credentials and endpoint.
    ///
    /// API key: `[providers.anthropic] api_key`, then `ANTHROPIC_API_KEY`.
    /// Base URL: `ANTHROPIC_BASE_URL`, then `[providers.anthropic] base_url`,
    /// then the public endpoint.
    ///
    /// # Errors
    /// Returns an error if no API key is available or the base URL is invalid.
    pub fn from_env(provider: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(
            provider.effective_api_key(),
            "ANTHROPIC_API_KEY",
            "anthropic",
        )?;
        let base_url = resolve_base_url(
            provider.effective_base_url(),
            "ANTHROPIC_BASE_URL",
            DEFAULT_BASE_URL,
            "Anthropic",
        )?;
        Ok(Self { api_key, base_url })
    }
}

/// Anthropic API client.
pub struct AnthropicClient {
    config: AnthropicConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    /// Creates a new client.
    ///
    /// # Panics
    /// In test builds, panics if `base_url` is the production API so unit
    /// tests cannot reach the network. Point `base_url` at a mock server.
    pub fn new(config: AnthropicConfig) -> Self {
        #[cfg(test)]
        assert!(
            config.base_url != DEFAULT_BASE_URL,
            "Tests must not use the production Anthropic API (base_url: {})",
            config.base_url
        );

        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Sends one generation request and returns the provider event stream.
    ///
    /// # Errors
    /// Returns a `ProviderError` (inside `anyhow`) on transport or HTTP failure.
    pub async fn send_messages_stream(&self, request: StreamRequest<'_>) -> Result<ProviderStream> {
        let settings = request.settings;
        let thinking = build_thinking_config(settings.thinking_budget);
        let mcp_servers = build_mcp_servers(request.mcp_servers);
        let betas = beta_header(thinking.is_some(), mcp_servers.is_some());

        let body = StreamingMessagesRequest {
            model: &settings.model,
            max_tokens: settings.max_tokens,
            messages: build_api_messages(request.messages),
            tools: build_tool_defs(request.tools, request.web_search),
            system: build_system_blocks(request.system),
            thinking,
            mcp_servers,
            stream: true,
        };

        let url = format!("{}/v1/messages", self.config.base_url);

        send_streaming_request(&self.http, &url, &body, |builder| {
            let builder = builder
                .header("anthropic-version", API_VERSION)
                .header("x-api-key", &self.config.api_key);
            match betas {
                Some(betas) => builder.header("anthropic-beta", betas),
                None => builder,
            }
        })
        .await
    }
}

fn beta_header(thinking: bool, mcp: bool) -> Option<String> {
    let betas: Vec<&str> = [
        thinking.then_some(INTERLEAVED_THINKING_BETA),
        mcp.then_some(MCP_CLIENT_BETA),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!betas.is_empty()).then(|| betas.join(","))
}

impl ModelProvider for AnthropicClient {
    fn stream<'a>(&'a self, request: StreamRequest<'a>) -> BoxFuture<'a, Result<ProviderStream>> {
        Box::pin(self.send_messages_stream(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_header_joins_enabled_features() {
        assert_eq!(beta_header(false, false), None);
        assert_eq!(
            beta_header(true, false).as_deref(),
            Some(INTERLEAVED_THINKING_BETA)
        );
        assert_eq!(beta_header(false, true).as_deref(), Some(MCP_CLIENT_BETA));
        assert_eq!(
            beta_header(true, true).as_deref(),
            Some("interleaved-thinking-2025-05-14,mcp-client-2025-04-04")
        );
    }
}
