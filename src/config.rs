//! Application-level configuration loading: cache backend and judgment worker settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GAVEL_BACK_CONFIG_PATH";

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 50;
const DEFAULT_JUDGE_TIMEOUT_SECS: u64 = 60;

/// Which cache backend fronts the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map.
    #[default]
    Memory,
    /// Redis at `REDIS_URL`; needs the `redis-cache` feature.
    Redis,
    /// No cache; every poll reads the store.
    None,
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Backend to use.
    pub backend: CacheBackend,
    /// Expiry applied to every cached room entry.
    pub ttl: Duration,
}

/// Settings of the background judgment pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Bound of the verdict queue and of the rescore queue; jobs beyond it are dropped.
    pub queue_capacity: usize,
    /// Upper bound on a single call to the judge.
    pub timeout: Duration,
    /// Rescore conviction after every message.
    pub interim_scoring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Cache backend and expiry.
    pub cache: CacheConfig,
    /// Judgment pool sizing and judge deadline.
    pub judgment: JudgmentConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        cache = ?app_config.cache.backend,
                        workers = app_config.judgment.workers,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    cache: RawCache,
    judgment: RawJudgment,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawCache {
    backend: CacheBackend,
    ttl_secs: u64,
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawJudgment {
    workers: usize,
    queue_capacity: usize,
    timeout_secs: u64,
    interim_scoring: bool,
}

impl Default for RawJudgment {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout_secs: DEFAULT_JUDGE_TIMEOUT_SECS,
            interim_scoring: true,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            cache: CacheConfig {
                backend: value.cache.backend,
                ttl: Duration::from_secs(value.cache.ttl_secs),
            },
            judgment: JudgmentConfig {
                workers: value.judgment.workers.max(1),
                queue_capacity: value.judgment.queue_capacity.max(1),
                timeout: Duration::from_secs(value.judgment.timeout_secs),
                interim_scoring: value.judgment.interim_scoring,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
