use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::analytics::{CorrelationMode, ResolveOptions};
use crate::services::classifier::BatchPolicy;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub classifier_url: String,
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub classify_concurrency: usize,
    pub keep_partial_results: bool,
    /// Zero disables the timeout.
    pub classifier_timeout_secs: u64,
    /// Zero disables the prediction cache.
    pub classifier_cache_capacity: u64,
    pub correlation_mode: CorrelationMode,
    pub likert_require_values: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier_url: "http://127.0.0.1:8000".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            classify_concurrency: 1,
            keep_partial_results: false,
            classifier_timeout_secs: 0,
            classifier_cache_capacity: 0,
            correlation_mode: CorrelationMode::Independent,
            likert_require_values: false,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let config = Config {
            classifier_url: lookup("CLASSIFIER_URL").unwrap_or(defaults.classifier_url),
            bind_addr: parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", defaults.max_file_size)?,
            classify_concurrency: parse_or(
                &lookup,
                "CLASSIFY_CONCURRENCY",
                defaults.classify_concurrency,
            )?,
            keep_partial_results: parse_or(
                &lookup,
                "KEEP_PARTIAL_RESULTS",
                defaults.keep_partial_results,
            )?,
            classifier_timeout_secs: parse_or(
                &lookup,
                "CLASSIFIER_TIMEOUT_SECS",
                defaults.classifier_timeout_secs,
            )?,
            classifier_cache_capacity: parse_or(
                &lookup,
                "CLASSIFIER_CACHE_CAPACITY",
                defaults.classifier_cache_capacity,
            )?,
            correlation_mode: match lookup("CORRELATION_MODE") {
                Some(raw) => raw.parse::<CorrelationMode>().map_err(anyhow::Error::msg)?,
                None => defaults.correlation_mode,
            },
            likert_require_values: parse_or(
                &lookup,
                "LIKERT_REQUIRE_VALUES",
                defaults.likert_require_values,
            )?,
        };

        if config.classify_concurrency == 0 {
            anyhow::bail!("CLASSIFY_CONCURRENCY must be at least 1");
        }
        Ok(config)
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            concurrency: self.classify_concurrency,
            keep_partial: self.keep_partial_results,
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            likert_requires_values: self.likert_require_values,
        }
    }

    pub fn classifier_timeout(&self) -> Option<Duration> {
        (self.classifier_timeout_secs > 0)
            .then(|| Duration::from_secs(self.classifier_timeout_secs))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={:?}", key, raw)),
        None => Ok(default),
    }
}

pub fn load_config() -> Result<Config> {
    let config = Config::new()?;
    tracing::info!(
        "Loaded config: classifier at {}, concurrency {}, correlation {:?}",
        config.classifier_url,
        config.classify_concurrency,
        config.correlation_mode
    );
    Ok(config)
}
