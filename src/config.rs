//! TOML configuration parsing and validation.
//!
//! Every section is optional. A missing section takes its defaults, so an
//! empty file (or [`Config::minimal`]) is a working configuration as long as
//! the API token environment variable is set.
//!
//! ```toml
//! [notion]
//! token_env = "NOTION_TOKEN"
//! api_base = "https://api.notion.com/v1"
//! api_version = "2022-06-28"
//! page_size = 100
//! timeout_secs = 30
//!
//! [cache]
//! path = "./data/page_cache.json"
//! ttl_secs = 3600
//!
//! [search]
//! api_hit_cap = 50
//! content_candidates = 20
//! request_delay_ms = 100
//!
//! [server]
//! bind = "127.0.0.1:7332"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    /// Name of the environment variable holding the integration token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Value sent in the `Notion-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_api_base(),
            api_version: default_api_version(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_token_env() -> String {
    "NOTION_TOKEN".to_string()
}
fn default_api_base() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_api_version() -> String {
    "2022-06-28".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Snapshot file location. The parent directory is created on save.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/page_cache.json")
}
fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// No further remote search pages are requested once this many hits
    /// have been gathered.
    #[serde(default = "default_api_hit_cap")]
    pub api_hit_cap: usize,
    /// How many cached pages the deep content scan reads.
    #[serde(default = "default_content_candidates")]
    pub content_candidates: usize,
    /// Length of the leading preview attached to remote and metadata hits.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_snippet_half_width")]
    pub snippet_half_width: usize,
    #[serde(default = "default_snippet_max_len")]
    pub snippet_max_len: usize,
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    /// Pause between paginated API requests.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_hit_cap: default_api_hit_cap(),
            content_candidates: default_content_candidates(),
            preview_chars: default_preview_chars(),
            snippet_half_width: default_snippet_half_width(),
            snippet_max_len: default_snippet_max_len(),
            default_max_results: default_max_results(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

fn default_api_hit_cap() -> usize {
    50
}
fn default_content_candidates() -> usize {
    20
}
fn default_preview_chars() -> usize {
    300
}
fn default_snippet_half_width() -> usize {
    100
}
fn default_snippet_max_len() -> usize {
    200
}
fn default_max_results() -> usize {
    10
}
fn default_request_delay_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7332".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load a config file, falling back to [`Config::minimal`] if it does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if !(1..=100).contains(&config.notion.page_size) {
        anyhow::bail!("notion.page_size must be in [1, 100]");
    }

    if config.search.api_hit_cap == 0 {
        anyhow::bail!("search.api_hit_cap must be >= 1");
    }

    if config.search.default_max_results == 0 {
        anyhow::bail!("search.default_max_results must be >= 1");
    }

    if config.notion.token_env.trim().is_empty() {
        anyhow::bail!("notion.token_env must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.cache.ttl_secs, 3600);
        assert_eq!(cfg.search.api_hit_cap, 50);
        assert_eq!(cfg.search.content_candidates, 20);
        assert_eq!(cfg.search.snippet_half_width, 100);
        assert_eq!(cfg.search.snippet_max_len, 200);
        assert_eq!(cfg.notion.token_env, "NOTION_TOKEN");
        assert_eq!(cfg.notion.page_size, 100);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
[cache]
ttl_secs = 60

[search]
request_delay_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(60));
        assert_eq!(cfg.search.request_delay_ms, 0);
        assert_eq!(cfg.search.preview_chars, 300);
        assert_eq!(cfg.server.bind, "127.0.0.1:7332");
    }

    #[test]
    fn rejects_zero_ttl() {
        let err = parse_config("[cache]\nttl_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("ttl_secs"));
    }

    #[test]
    fn rejects_oversized_page() {
        assert!(parse_config("[notion]\npage_size = 500\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_minimal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.cache.ttl_secs, 3600);
    }
}
