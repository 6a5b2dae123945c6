//! Configuration loading and per-request generation options.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for interleave configuration.
    //!
    //! `INTERLEAVE_HOME` resolution order:
    //! 1. `INTERLEAVE_HOME` environment variable (if set)
    //! 2. `~/.config/interleave` (default)

    use std::path::PathBuf;

    /// Returns the interleave home directory, if one can be determined.
    pub fn interleave_home() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("INTERLEAVE_HOME")
            && !home.trim().is_empty()
        {
            return Some(PathBuf::from(home));
        }
        dirs::home_dir().map(|h| h.join(".config").join("interleave"))
    }

    /// Returns the path to `config.toml`, if a home directory exists.
    pub fn config_path() -> Option<PathBuf> {
        interleave_home().map(|home| home.join("config.toml"))
    }
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the HTTP routes (`/api` gives `/api/chat/stream`).
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            base_path: "/api".to_string(),
        }
    }
}

/// Approximate user location forwarded to the provider's web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLocation {
    #[serde(rename = "type", default = "approximate")]
    pub location_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

fn approximate() -> String {
    "approximate".to_string()
}

/// Provider-hosted web search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub max_uses: u32,
    pub allowed_domains: Option<Vec<String>>,
    pub blocked_domains: Option<Vec<String>>,
    pub user_location: Option<UserLocation>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_uses: 5,
            allowed_domains: None,
            blocked_domains: None,
            user_location: None,
        }
    }
}

/// Remote MCP server the provider connects to on the model's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_token: Option<String>,
}

/// Provider configuration entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies and tests).
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model when a request does not name one
    pub model: String,

    pub max_tokens: u32,

    /// Extended thinking budget in tokens (0 disables thinking)
    pub thinking_budget: u32,

    /// Maximum tool continuation rounds per turn
    pub max_rounds: usize,

    /// Timeout for one tool call in seconds (0 disables)
    pub tool_timeout_secs: u32,

    /// Optional inline system prompt
    pub system_prompt: Option<String>,

    /// Optional path to a file containing the system prompt
    pub system_prompt_file: Option<String>,

    pub server: ServerConfig,

    pub web_search: WebSearchConfig,

    /// MCP servers sent with every generation and continuation
    pub mcp_servers: Vec<McpServerConfig>,

    pub providers: ProvidersConfig,
}

impl Config {
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
    pub const DEFAULT_MAX_TOKENS: u32 = 16000;
    pub const DEFAULT_THINKING_BUDGET: u32 = 10000;
    pub const DEFAULT_MAX_ROUNDS: usize = 8;
    const DEFAULT_TOOL_TIMEOUT_SECS: u32 = 30;
    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Reason through \
         problems step by step and use the available tools when they help answer the question.";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        match paths::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Loads from `path` when given, else from the default location.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_optional(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Returns the effective system prompt: the file wins over the inline
    /// value, and the built-in prompt is used when neither is set.
    ///
    /// # Errors
    /// Returns an error if `system_prompt_file` is set but unreadable.
    pub fn effective_system_prompt(&self) -> Result<String> {
        if let Some(path_str) = &self.system_prompt_file {
            let content = fs::read_to_string(path_str)
                .with_context(|| format!("Failed to read system prompt file: {path_str}"))?;
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        let trimmed = self.system_prompt.as_deref().unwrap_or("").trim();
        if trimmed.is_empty() {
            Ok(Self::DEFAULT_SYSTEM_PROMPT.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Registers an MCP server, replacing any existing entry with the same name.
    pub fn add_mcp_server(&mut self, server: McpServerConfig) {
        self.mcp_servers.retain(|s| s.name != server.name);
        self.mcp_servers.push(server);
    }

    /// Returns `true` if a server with this name was removed.
    pub fn remove_mcp_server(&mut self, name: &str) -> bool {
        let before = self.mcp_servers.len();
        self.mcp_servers.retain(|s| s.name != name);
        self.mcp_servers.len() != before
    }

    pub fn mcp_server_names(&self) -> Vec<&str> {
        self.mcp_servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        if self.tool_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.tool_timeout_secs)))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            thinking_budget: Self::DEFAULT_THINKING_BUDGET,
            max_rounds: Self::DEFAULT_MAX_ROUNDS,
            tool_timeout_secs: Self::DEFAULT_TOOL_TIMEOUT_SECS,
            system_prompt: None,
            system_prompt_file: None,
            server: ServerConfig::default(),
            web_search: WebSearchConfig::default(),
            mcp_servers: Vec::new(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Per-request generation options. Each field falls back to [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

/// Generation settings after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    /// 0 disables extended thinking.
    pub thinking_budget: u32,
}

impl GenerationOptions {
    pub fn resolve(&self, config: &Config) -> GenerationSettings {
        GenerationSettings {
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(&config.model)
                .to_string(),
            max_tokens: self.max_tokens.unwrap_or(config.max_tokens),
            thinking_budget: self.thinking_budget.unwrap_or(config.thinking_budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.max_tokens, 16000);
        assert_eq!(config.thinking_budget, 10000);
        assert_eq!(config.max_rounds, 8);
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.base_path, "/api");
        assert_eq!(config.web_search.max_uses, 5);
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
model = "claude-opus-4-1"
max_rounds = 3

[server]
port = 8080

[web_search]
enabled = true
blocked_domains = ["example.com"]

[web_search.user_location]
city = "Lisbon"

[providers.anthropic]
base_url = "http://localhost:9999"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model, "claude-opus-4-1");
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.max_tokens, 16000);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.web_search.enabled);
        assert_eq!(config.web_search.max_uses, 5);
        assert_eq!(
            config.web_search.blocked_domains,
            Some(vec!["example.com".to_string()])
        );
        let location = config.web_search.user_location.unwrap();
        assert_eq!(location.location_type, "approximate");
        assert_eq!(location.city.as_deref(), Some("Lisbon"));
        assert_eq!(
            config.providers.anthropic.effective_base_url(),
            Some("http://localhost:9999")
        );
    }

    #[test]
    fn test_load_mcp_servers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[[mcp_servers]]
name = "docs"
url = "https://mcp.example.com/sse"
authorization_token = "secret"

[[mcp_servers]]
name = "tickets"
url = "https://tickets.example.com/mcp"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.mcp_server_names(), vec!["docs", "tickets"]);
        assert_eq!(
            config.mcp_servers[0].authorization_token.as_deref(),
            Some("secret")
        );
        assert_eq!(config.mcp_servers[1].authorization_token, None);
    }

    #[test]
    fn test_add_and_remove_mcp_server() {
        let mut config = Config::default();
        assert!(config.mcp_servers.is_empty());

        config.add_mcp_server(McpServerConfig {
            name: "docs".into(),
            url: "https://old.example.com".into(),
            authorization_token: None,
        });
        config.add_mcp_server(McpServerConfig {
            name: "docs".into(),
            url: "https://new.example.com".into(),
            authorization_token: None,
        });
        assert_eq!(config.mcp_servers.len(), 1);
        assert_eq!(config.mcp_servers[0].url, "https://new.example.com");

        assert!(config.remove_mcp_server("docs"));
        assert!(!config.remove_mcp_server("docs"));
        assert!(config.mcp_server_names().is_empty());
    }

    #[test]
    fn test_load_invalid_toml_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_rounds = \"many\"").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_system_prompt_resolution() {
        let dir = tempdir().unwrap();
        let prompt_file = dir.path().join("prompt.txt");
        fs::write(&prompt_file, "  file prompt\n").unwrap();

        let config = Config {
            system_prompt_file: Some(prompt_file.to_str().unwrap().to_string()),
            system_prompt: Some("inline prompt".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_system_prompt().unwrap(), "file prompt");

        let config = Config {
            system_prompt: Some("inline prompt".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_system_prompt().unwrap(), "inline prompt");

        assert_eq!(
            Config::default().effective_system_prompt().unwrap(),
            Config::DEFAULT_SYSTEM_PROMPT
        );
    }

    #[test]
    fn test_tool_timeout() {
        let config = Config {
            tool_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.tool_timeout(), None);
        assert_eq!(
            Config::default().tool_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_generation_options_camel_case_and_defaults() {
        let options: GenerationOptions =
            serde_json::from_str(r#"{"maxTokens": 2048, "thinkingBudget": 0}"#).unwrap();
        let settings = options.resolve(&Config::default());
        assert_eq!(settings.model, Config::DEFAULT_MODEL);
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.thinking_budget, 0);

        let options = GenerationOptions {
            model: Some("claude-opus-4-1".to_string()),
            ..Default::default()
        };
        let settings = options.resolve(&Config::default());
        assert_eq!(settings.model, "claude-opus-4-1");
        assert_eq!(settings.thinking_budget, 10000);
    }
}
