// config.rs - Bot Configuration
// Reads KEY=VALUE settings from botconfig.txt (searched in the same places the
// bot has always looked) with the process environment as fallback.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::paging::MAX_PAGE_SIZE;

const CONFIG_PATHS: [&str; 4] = [
    "botconfig.txt",
    "../botconfig.txt",
    "../../botconfig.txt",
    "src/botconfig.txt",
];

const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not found in botconfig.txt or the environment")]
    Missing(&'static str),
    #[error("{0} in botconfig.txt is set to a placeholder value")]
    Placeholder(&'static str),
    #[error("{key} must be a valid number (got '{value}')")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub discord_token: String,
    pub prefix: String,
    pub admin_role: String,
    pub api_base_url: String,
    pub api_key: String,
    pub api_timeout_secs: u64,
    pub cache_poll_interval_secs: u64,
    pub cache_poll_deadline_hours: u64,
    pub page_size: usize,
    pub reaction_context_ttl_secs: u64,
    pub component_context_ttl_secs: u64,
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.cache_poll_interval_secs)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_secs(self.cache_poll_deadline_hours * 3600)
    }
}

/// Parse `KEY=VALUE` lines. BOM is stripped, blank lines and `#` comments skipped.
pub fn parse_pairs(content: &str) -> HashMap<String, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Build the config from file pairs, asking `fallback` for keys the file lacks.
pub fn build_config(
    pairs: &HashMap<String, String>,
    fallback: impl Fn(&str) -> Option<String>,
) -> Result<BotConfig, ConfigError> {
    let lookup = |key: &str| {
        pairs
            .get(key)
            .cloned()
            .or_else(|| fallback(key))
            .filter(|v| !v.is_empty())
    };
    let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
    let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
        match lookup(key) {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { key, value }),
            None => Ok(default),
        }
    };

    let discord_token = required("DISCORD_TOKEN")?;
    if discord_token == TOKEN_PLACEHOLDER {
        return Err(ConfigError::Placeholder("DISCORD_TOKEN"));
    }

    Ok(BotConfig {
        discord_token,
        prefix: lookup("PREFIX").unwrap_or_else(|| "!".to_string()),
        admin_role: lookup("ADMIN_ROLE").unwrap_or_else(|| "Admin".to_string()),
        api_base_url: required("API_BASE_URL")?,
        api_key: required("API_KEY")?,
        api_timeout_secs: number("API_TIMEOUT_SECS", 30)?,
        cache_poll_interval_secs: number("CACHE_POLL_INTERVAL_SECS", 2)?.max(1),
        cache_poll_deadline_hours: number("CACHE_POLL_DEADLINE_HOURS", 12)?,
        page_size: (number("PAGE_SIZE", MAX_PAGE_SIZE as u64)? as usize).clamp(1, MAX_PAGE_SIZE),
        reaction_context_ttl_secs: number("REACTION_CONTEXT_TTL_SECS", 300)?,
        component_context_ttl_secs: number("COMPONENT_CONTEXT_TTL_SECS", 900)?,
    })
}

/// Load configuration from the first botconfig.txt found, falling back to env vars.
pub fn load_bot_config() -> Result<BotConfig, ConfigError> {
    let mut pairs = HashMap::new();
    for path in &CONFIG_PATHS {
        if let Ok(content) = fs::read_to_string(path) {
            log::info!("[CONFIG] Configuration loaded from {}", path);
            pairs = parse_pairs(&content);
            break;
        }
    }
    if pairs.is_empty() {
        log::warn!("[CONFIG] No botconfig.txt found (., .., ../.., src/), using environment only");
    }
    build_config(&pairs, |key| env::var(key).ok())
}
