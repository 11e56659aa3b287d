//! Configuration for the Obsidian MCP server.

use std::time::Duration;

use secrecy::SecretString;

use crate::cache::CacheConfig;
use crate::env_util::{parse_bool_env, parse_env_or};
use crate::error::ConfigError;

/// Top-level configuration, assembled from environment variables.
#[derive(Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Applies `.env`, if present, before reading, then fails loudly on any
    /// missing required value rather than silently defaulting.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            upstream: UpstreamConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            batch: BatchConfig::from_env()?,
        })
    }
}

/// Connection details for the upstream Obsidian Local REST API plugin.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
    pub api_key: SecretString,
    pub insecure_http: bool,
    pub timeout: Duration,
}

impl UpstreamConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("OBSIDIAN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env_or("OBSIDIAN_PORT", 27124)?;
        let api_key = std::env::var("OBSIDIAN_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OBSIDIAN_API_KEY".to_string()))?
            .into();
        let insecure_http = parse_bool_env("OBSIDIAN_INSECURE_HTTP", false)?;
        let timeout_secs = parse_env_or("OBSIDIAN_UPSTREAM_TIMEOUT_SECS", 6u64)?;

        Ok(Self {
            host,
            port,
            api_key,
            insecure_http,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Base URL for the upstream plugin, e.g. `https://127.0.0.1:27124`.
    pub fn base_url(&self) -> String {
        let scheme = if self.insecure_http { "http" } else { "https" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Tuning knobs for the bounded-concurrency batch processor.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl BatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrency: parse_env_or("OBSIDIAN_BATCH_MAX_CONCURRENCY", 5usize)?,
            retry_attempts: parse_env_or("OBSIDIAN_BATCH_RETRY_ATTEMPTS", 3u32)?,
            retry_delay: Duration::from_millis(parse_env_or(
                "OBSIDIAN_BATCH_RETRY_DELAY_MS",
                500u64,
            )?),
        })
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

