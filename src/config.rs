// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::access::AccessScope;
use crate::dispatch::DispatchLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(default)]
    pub allowed_guilds: Vec<String>,
    #[serde(default)]
    pub allowed_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
    #[serde(default = "default_search_scan_depth")]
    pub search_scan_depth: usize,
    #[serde(default = "default_guild_search_channel_depth")]
    pub guild_search_channel_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            ask_timeout_secs: default_ask_timeout_secs(),
            search_scan_depth: default_search_scan_depth(),
            guild_search_channel_depth: default_guild_search_channel_depth(),
        }
    }
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_max_requests() -> usize {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_ask_timeout_secs() -> u64 {
    300
}

fn default_search_scan_depth() -> usize {
    1000
}

fn default_guild_search_channel_depth() -> usize {
    500
}

/// Parse a comma-separated id list; blank entries are dropped.
fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("HERALD_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path))?
        } else {
            Config {
                discord: DiscordConfig {
                    token: String::new(),
                    allowed_guilds: Vec::new(),
                    allowed_channels: Vec::new(),
                },
                api: ApiConfig {
                    host: default_api_host(),
                    port: default_api_port(),
                    api_key: String::new(),
                },
                limits: LimitsConfig::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("DISCORD_TOKEN") {
            config.discord.token = val;
        }
        if let Ok(val) = std::env::var("ALLOWED_GUILDS") {
            config.discord.allowed_guilds = parse_id_list(&val);
        }
        if let Ok(val) = std::env::var("ALLOWED_CHANNELS") {
            config.discord.allowed_channels = parse_id_list(&val);
        }
        if let Ok(val) = std::env::var("API_HOST") {
            config.api.host = val;
        }
        if let Ok(val) = std::env::var("API_PORT") {
            config.api.port = val
                .parse()
                .with_context(|| format!("API_PORT must be a valid port number, got: {}", val))?;
        }
        if let Ok(val) = std::env::var("API_KEY") {
            config.api.api_key = val;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_MAX_REQUESTS") {
            config.limits.max_requests = val.parse().with_context(|| {
                format!("RATE_LIMIT_MAX_REQUESTS must be an integer, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_WINDOW_SECS") {
            config.limits.window_secs = val.parse().with_context(|| {
                format!("RATE_LIMIT_WINDOW_SECS must be an integer, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("ASK_TIMEOUT_SECS") {
            config.limits.ask_timeout_secs = val
                .parse()
                .with_context(|| format!("ASK_TIMEOUT_SECS must be an integer, got: {}", val))?;
        }

        // Validate required fields
        if config.discord.token.trim().is_empty() {
            anyhow::bail!(
                "discord.token is required (set in config.toml or DISCORD_TOKEN env var)"
            );
        }
        if config.api.api_key.trim().is_empty() {
            anyhow::bail!("api.api_key is required (set in config.toml or API_KEY env var)");
        }
        if config.limits.max_requests == 0 {
            anyhow::bail!("limits.max_requests must be at least 1");
        }
        if config.limits.window_secs == 0 {
            anyhow::bail!("limits.window_secs must be at least 1");
        }

        // Allow-list entries must look like Discord snowflakes
        for id in config
            .discord
            .allowed_guilds
            .iter()
            .chain(config.discord.allowed_channels.iter())
        {
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                anyhow::bail!(
                    "Invalid id in allow-list (expected numeric snowflake): {:?}",
                    id
                );
            }
        }

        Ok(config)
    }

    /// Allow-list scope consulted by every handler.
    pub fn access_scope(&self) -> AccessScope {
        AccessScope::new(
            self.discord.allowed_guilds.iter().cloned(),
            self.discord.allowed_channels.iter().cloned(),
        )
    }

    pub fn dispatch_limits(&self) -> DispatchLimits {
        DispatchLimits {
            ask_timeout: Duration::from_secs(self.limits.ask_timeout_secs),
            search_scan_depth: self.limits.search_scan_depth,
            guild_search_channel_depth: self.limits.guild_search_channel_depth,
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.limits.window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2 ,3"), vec!["1", "2", "3"]);
        assert_eq!(parse_id_list(""), Vec::<String>::new());
        assert_eq!(parse_id_list(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_requests, 100);
        assert_eq!(limits.window_secs, 60);
        assert_eq!(limits.ask_timeout_secs, 300);
        assert_eq!(limits.search_scan_depth, 1000);
        assert_eq!(limits.guild_search_channel_depth, 500);
    }

    #[test]
    fn test_toml_defaults_fill_in() {
        let toml_src = r#"
            [discord]
            token = "t0ken"
            allowed_guilds = ["1"]

            [api]
            api_key = "secret"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.discord.token, "t0ken");
        assert_eq!(config.discord.allowed_guilds, vec!["1"]);
        assert!(config.discord.allowed_channels.is_empty());
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.limits.max_requests, 100);
    }

    #[test]
    fn test_access_scope_from_config() {
        let config: Config = toml::from_str(
            r#"
            [discord]
            token = "t"
            allowed_guilds = ["1"]
            allowed_channels = ["42"]

            [api]
            api_key = "k"
        "#,
        )
        .unwrap();
        let scope = config.access_scope();
        assert!(scope.is_allowed("1", "42"));
        assert!(!scope.is_allowed("2", "42"));
    }
}
