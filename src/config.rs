//! Runtime configuration: optional JSON file plus environment overrides.
//! Every window, threshold and TTL lives here rather than in the code.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::translate::Language;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_language: Language,
    pub batch: BatchConfig,
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_language: Language::En,
            batch: BatchConfig::default(),
            gateway: GatewayConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Coalescing window and size threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub window_ms: u64,
    pub max_batch: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_ms: 200,
            max_batch: 20,
        }
    }
}

/// Provider-facing limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum texts per provider call.
    pub max_chunk: usize,
    pub chunk_delay_ms: u64,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Ceiling on any single retry wait, provider-requested or backoff.
    pub max_retry_wait_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_chunk: 50,
            chunk_delay_ms: 100,
            requests_per_window: 60,
            window_secs: 60,
            max_retries: 3,
            base_backoff_ms: 1000,
            max_retry_wait_ms: 60_000,
            request_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub memory_capacity: usize,
    pub db_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            max_entries: 5000,
            memory_capacity: 2048,
            db_path: PathBuf::from("translation_cache.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub route_timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:4000".into(),
            route_timeout_secs: 8,
            requests_per_minute: 120,
        }
    }
}

/// Upstream provider selection. A relay URL, when set, routes through another
/// instance of this service instead of calling DeepL directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub relay_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api-free.deepl.com/v2/translate".into(),
            api_key: None,
            relay_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "batch_translate=info".into(),
            json: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl Config {
    /// Load from `path` (defaults when `None`), apply env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `DEEPL_API_KEY`, `DEEPL_API_URL`, `TRANSLATE_BIND`,
    /// `TRANSLATE_CACHE_DB` and `TRANSLATE_RELAY_URL` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("DEEPL_API_KEY").filter(|v| !v.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("DEEPL_API_URL").filter(|v| !v.is_empty()) {
            self.provider.api_url = url;
        }
        if let Some(bind) = lookup("TRANSLATE_BIND").filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(db) = lookup("TRANSLATE_CACHE_DB").filter(|v| !v.is_empty()) {
            self.cache.db_path = PathBuf::from(db);
        }
        if let Some(relay) = lookup("TRANSLATE_RELAY_URL").filter(|v| !v.is_empty()) {
            self.provider.relay_url = Some(relay);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.batch.window_ms == 0, "batch.window_ms must be > 0"),
            (self.batch.max_batch == 0, "batch.max_batch must be > 0"),
            (self.gateway.max_chunk == 0, "gateway.max_chunk must be > 0"),
            (self.gateway.requests_per_window == 0, "gateway.requests_per_window must be > 0"),
            (self.gateway.window_secs == 0, "gateway.window_secs must be > 0"),
            (self.gateway.request_timeout_secs == 0, "gateway.request_timeout_secs must be > 0"),
            (self.cache.ttl_secs == 0, "cache.ttl_secs must be > 0"),
            (self.cache.max_entries == 0, "cache.max_entries must be > 0"),
            (self.cache.memory_capacity == 0, "cache.memory_capacity must be > 0"),
            (self.server.requests_per_minute == 0, "server.requests_per_minute must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(ConfigError::Invalid((*msg).to_string())),
            None => Ok(()),
        }
    }
}
