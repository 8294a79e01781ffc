//! Governance configuration structures.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{
    validate_max_threads, AppResult, CoreError, DEFAULT_CACHE_EXPIRATION_SECS, DEFAULT_MURMUR3_SEED,
    MAX_THREADS, MAX_WINDOW, MIN_THREADS,
};

/// Prefix of every environment variable read by [`CoreConfig::from_env`].
pub const ENV_PREFIX: &str = "CRAWL_GOVERNOR_";

/// Execution backend for the thread manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchBackend {
    /// One OS thread per work item.
    #[default]
    Dedicated,
    /// Tokio blocking pool with cooperative cancellation.
    Pooled,
}

/// Fingerprint algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// MD5.
    Md5,
    /// Murmur3 x64 128.
    #[default]
    Murmur3,
}

/// Thread manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadManagerConfig {
    /// Maximum concurrently running work items (1-100).
    pub max_threads: usize,
    /// Execution backend.
    pub backend: DispatchBackend,
}

impl Default for ThreadManagerConfig {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().clamp(MIN_THREADS, MAX_THREADS),
            backend: DispatchBackend::default(),
        }
    }
}

/// Memory monitoring and admission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Seconds between cached usage refreshes; non-positive means the default.
    pub cache_expiration_secs: i64,
    /// Stop crawling above this usage. Zero disables the check.
    pub max_memory_usage_mb: u64,
    /// Stop crawling unless this much memory can be obtained. Zero disables
    /// the check.
    pub min_available_memory_mb: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_expiration_secs: DEFAULT_CACHE_EXPIRATION_SECS.cast_signed(),
            max_memory_usage_mb: 0,
            min_available_memory_mb: 0,
        }
    }
}

/// Global request rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub occurrences: usize,
    /// Window length in milliseconds.
    pub window_ms: i64,
}

impl RateLimitConfig {
    /// Validate the limit.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.occurrences < 1 {
            return Err(CoreError::config("rate_limit.occurrences must be at least 1"));
        }
        if self.window_ms < 0 {
            return Err(CoreError::config("rate_limit.window_ms must not be negative"));
        }
        if u128::from(self.window_ms.unsigned_abs()) > MAX_WINDOW.as_millis() {
            return Err(CoreError::config("rate_limit.window_ms must not exceed 24 hours"));
        }
        Ok(())
    }
}

/// Fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    /// Algorithm.
    pub algorithm: HashAlgorithm,
    /// Seed for Murmur3.
    pub murmur3_seed: u64,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            murmur3_seed: DEFAULT_MURMUR3_SEED,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Dispatcher settings.
    pub thread_manager: ThreadManagerConfig,
    /// Memory settings.
    pub memory: MemoryConfig,
    /// Optional global rate limit.
    pub rate_limit: Option<RateLimitConfig>,
    /// Default per-domain crawl delay in milliseconds. Zero disables it.
    pub min_crawl_delay_ms: u64,
    /// Fingerprint settings.
    pub hashing: HashConfig,
}

impl CoreConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_max_threads(self.thread_manager.max_threads)
            .map_err(|e| CoreError::config(format!("thread_manager invalid: {e}")))?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if cfg!(not(feature = "tokio-runtime"))
            && self.thread_manager.backend == DispatchBackend::Pooled
        {
            return Err(CoreError::config(
                "pooled backend requires the `tokio-runtime` feature",
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, CoreError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| CoreError::config(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("loading config file {}", path.display()))
    }

    /// Defaults overridden by `CRAWL_GOVERNOR_*` environment variables, after
    /// loading a `.env` file if one exists.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `CRAWL_GOVERNOR_*` name.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut cfg = Self::default();

        if let Some(v) = parse_var(&var, "MAX_THREADS")? {
            cfg.thread_manager.max_threads = v;
        }
        if let Some(v) = enum_var(&var, "BACKEND")? {
            cfg.thread_manager.backend = v;
        }
        if let Some(v) = parse_var(&var, "CACHE_EXPIRATION_SECS")? {
            cfg.memory.cache_expiration_secs = v;
        }
        if let Some(v) = parse_var(&var, "MAX_MEMORY_MB")? {
            cfg.memory.max_memory_usage_mb = v;
        }
        if let Some(v) = parse_var(&var, "MIN_AVAILABLE_MEMORY_MB")? {
            cfg.memory.min_available_memory_mb = v;
        }
        let occurrences: Option<usize> = parse_var(&var, "RATE_OCCURRENCES")?;
        let window_ms: Option<i64> = parse_var(&var, "RATE_WINDOW_MS")?;
        match (occurrences, window_ms) {
            (Some(occurrences), Some(window_ms)) => {
                cfg.rate_limit = Some(RateLimitConfig {
                    occurrences,
                    window_ms,
                });
            }
            (None, None) => {}
            _ => anyhow::bail!(
                "{ENV_PREFIX}RATE_OCCURRENCES and {ENV_PREFIX}RATE_WINDOW_MS must be set together"
            ),
        }
        if let Some(v) = parse_var(&var, "MIN_CRAWL_DELAY_MS")? {
            cfg.min_crawl_delay_ms = v;
        }
        if let Some(v) = enum_var(&var, "HASH")? {
            cfg.hashing.algorithm = v;
        }
        if let Some(v) = parse_var(&var, "MURMUR3_SEED")? {
            cfg.hashing.murmur3_seed = v;
        }

        cfg.validate().context("validating environment configuration")?;
        Ok(cfg)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, suffix: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(suffix)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid {ENV_PREFIX}{suffix}: {raw:?}"))
        })
        .transpose()
}

fn enum_var<T>(var: &impl Fn(&str) -> Option<String>, suffix: &str) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
{
    var(suffix)
        .map(|raw| {
            let value = serde_json::Value::String(raw.trim().to_ascii_lowercase());
            serde_json::from_value(value)
                .with_context(|| format!("invalid {ENV_PREFIX}{suffix}: {raw:?}"))
        })
        .transpose()
}
