use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::backend::retry::RetryConfig;
use crate::backend::{HttpBackend, NullBackend, VoteBackend};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::session::ReconcilePolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryConfig,
    pub reconcile: ReconcilePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: None,
            timeout_ms: 5000,
            retry: RetryConfig::default(),
            reconcile: ReconcilePolicy::Revert,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults, malformed
    /// values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let reconcile = match lookup("VOTE_RECONCILE") {
            Some(raw) => raw.parse()?,
            None => defaults.reconcile,
        };
        Ok(Self {
            api_base: lookup("VOTE_API_BASE").filter(|s| !s.trim().is_empty()),
            timeout_ms: parse_var(&lookup, "VOTE_TIMEOUT_MS", defaults.timeout_ms)?,
            retry: RetryConfig {
                max_retries: parse_var(&lookup, "VOTE_MAX_RETRIES", defaults.retry.max_retries)?,
                base_delay_ms: parse_var(
                    &lookup,
                    "VOTE_RETRY_BASE_MS",
                    defaults.retry.base_delay_ms,
                )?,
                max_delay_ms: parse_var(&lookup, "VOTE_RETRY_MAX_MS", defaults.retry.max_delay_ms)?,
                jitter_factor: defaults.retry.jitter_factor,
            },
            reconcile,
        })
    }

    /// HTTP backend when an API base is configured, otherwise the null stub.
    pub fn backend(&self) -> Result<Arc<dyn VoteBackend + Send + Sync>> {
        match &self.api_base {
            Some(base) => {
                log(
                    Level::Info,
                    Domain::System,
                    "backend",
                    obj(&[("type", v_str("http")), ("base", v_str(base))]),
                );
                Ok(Arc::new(HttpBackend::new(
                    base,
                    Duration::from_millis(self.timeout_ms),
                    self.retry.clone(),
                )?))
            }
            None => {
                log(
                    Level::Info,
                    Domain::System,
                    "backend",
                    obj(&[("type", v_str("null")), ("status", v_str("stub"))]),
                );
                Ok(Arc::new(NullBackend))
            }
        }
    }
}

/// Parse `key` into the field's own type, so out-of-range values fail
/// instead of wrapping.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl FromStr for ReconcilePolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "revert" => Ok(ReconcilePolicy::Revert),
            "preserve" => Ok(ReconcilePolicy::Preserve),
            other => Err(anyhow!("unknown reconcile policy {:?}", other)),
        }
    }
}
