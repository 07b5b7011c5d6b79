//! Configuration model and JSON loading.
//!
//! Keys are camelCase so existing middleware configuration documents load
//! unchanged:
//!
//! ```json
//! {
//!   "upstream": "http://127.0.0.1:9000",
//!   "backend": { "kind": "redis", "address": "127.0.0.1:6379", "timeout": 1 },
//!   "hashKey": { "method": { "enable": true }, "header": { "enable": true, "fields": "Accept,Authorization" } },
//!   "forceCache": { "enable": false, "expiredTime": 0 }
//! }
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header names excluded from the header digest when no deny-list is configured.
pub const DEFAULT_IGNORED_HEADERS: [&str; 3] = ["X-Request-Id", "Postman-Token", "Content-Length"];

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Entry limit of the memory backend when `maxEntries` is unset.
pub const DEFAULT_MEMORY_ENTRIES: usize = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Full configuration of the caching proxy binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the proxy listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Base URL of the upstream service, e.g. `http://127.0.0.1:9000`.
    pub upstream: String,

    #[serde(flatten)]
    pub cache: CacheConfig,
}

impl Config {
    /// Reads, parses, and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let upstream = self.upstream.trim();
        if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "upstream",
                format!("expected an absolute http(s) URL, got `{upstream}`"),
            ));
        }
        self.cache.validate()
    }
}

/// The part of the configuration the caching middleware consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Deployment environment tag. Anything but `production` enables debug headers.
    #[serde(default = "default_env")]
    pub env: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub hash_key: HashKeyConfig,

    #[serde(default)]
    pub force_cache: ForceCacheConfig,

    #[serde(default)]
    pub alert: AlertConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            backend: BackendConfig::default(),
            hash_key: HashKeyConfig::default(),
            force_cache: ForceCacheConfig::default(),
            alert: AlertConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Redis && self.backend.address.trim().is_empty() {
            return Err(ConfigError::invalid(
                "backend.address",
                "a redis backend needs an address",
            ));
        }
        if let Some(telegram) = &self.alert.telegram {
            if telegram.token.is_empty() || telegram.chat_id.is_empty() {
                return Err(ConfigError::invalid(
                    "alert.telegram",
                    "both token and chatId are required",
                ));
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(self.env.to_ascii_lowercase().as_str(), "production" | "prod")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Redis,
    Memory,
}

/// Connection parameters for the shared store.
///
/// Two middleware instances with equal `BackendConfig` values share one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// `host:port` or a full `redis://` URL.
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Number of multiplexed connections kept open and used round-robin.
    #[serde(default)]
    pub max_idle_connection: Option<u32>,

    /// Per-call timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Entry limit of the memory backend. Least recently used entries are
    /// evicted past it.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl BackendConfig {
    pub fn memory() -> Self {
        Self {
            kind: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// Identity of this configuration for backend sharing.
    pub fn canonical(&self) -> String {
        format!("{self:?}")
    }

    pub fn call_timeout(&self) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Memory backend capacity, clamped to at least one entry.
    pub fn memory_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries.unwrap_or(DEFAULT_MEMORY_ENTRIES)).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn connections(&self) -> usize {
        self.max_idle_connection.map_or(1, |n| n.max(1) as usize)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    #[serde(default)]
    pub enable: bool,
}

/// Which request dimensions contribute to the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashKeyConfig {
    pub method: Toggle,
    pub header: HeaderHashConfig,
    pub body: Toggle,
}

impl Default for HashKeyConfig {
    fn default() -> Self {
        Self {
            method: Toggle { enable: true },
            header: HeaderHashConfig::default(),
            body: Toggle::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderHashConfig {
    pub enable: bool,
    /// Comma-separated allow-list. Takes precedence over `ignore_fields`.
    pub fields: Option<String>,
    /// Comma-separated deny-list, replacing [`DEFAULT_IGNORED_HEADERS`].
    pub ignore_fields: Option<String>,
}

/// Caches every response for a fixed TTL, bypassing header evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceCacheConfig {
    pub enable: bool,
    /// TTL in seconds. Non-positive values fall back to one hour.
    pub expired_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// Splits a comma-separated header list, dropping blanks.
pub fn split_fields(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_owned)
        .collect()
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_owned()
}

fn default_env() -> String {
    std::env::var("APPLICATION_ENV").unwrap_or_else(|_| "production".to_owned())
}
