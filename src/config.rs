use crate::engine::{BreakerConfig, PlaybackConfig, DEFAULT_PAGE_SIZE};
use crate::feed::types::ContentSource;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_FILE: &str = ".env";
const API_TOKEN_VAR: &str = "REEL_FEED_API_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub sources: Vec<ContentSource>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,
}

fn default_timeout() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_s: u64,
}

fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }
fn default_cache_ttl() -> u64 { 300 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl_s: 300,
        }
    }
}

impl FeedConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_s: u64,
}

fn default_failure_threshold() -> u32 { 3 }
fn default_cooldown() -> u64 { 30 }

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_s: 30,
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            cooldown: Duration::from_secs(self.cooldown_s),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaybackSettings {
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    #[serde(default = "default_preload_margin")]
    pub preload_margin_px: u32,
    #[serde(default = "default_skip_delay")]
    pub skip_delay_ms: u64,
}

fn default_visibility_threshold() -> f64 { 0.5 }
fn default_preload_margin() -> u32 { 200 }
fn default_skip_delay() -> u64 { 1000 }

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            preload_margin_px: 200,
            skip_delay_ms: 1000,
        }
    }
}

impl PlaybackSettings {
    pub fn to_playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            visibility_threshold: self.visibility_threshold.clamp(0.0, 1.0),
            preload_margin_px: self.preload_margin_px,
            skip_delay: Duration::from_millis(self.skip_delay_ms),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if let Some(dup) = config.duplicate_source_id() {
            anyhow::bail!("source id '{}' is configured more than once", dup);
        }
        Ok(config)
    }

    fn duplicate_source_id(&self) -> Option<&str> {
        self.sources
            .iter()
            .enumerate()
            .find(|(i, s)| self.sources[..*i].iter().any(|o| o.id == s.id))
            .map(|(_, s)| s.id.as_str())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// Bearer token for the backend, if one is set.
    pub fn api_token() -> Option<String> {
        match std::env::var(API_TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => Some(sanitize_key(&token)),
            _ => None,
        }
    }
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
