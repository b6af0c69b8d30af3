//! Scope resolver configuration loading and validation

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuthzError, Result};

/// Environment variable overriding [`ResolverConfig::cache_capacity`]
pub const ENV_CACHE_SIZE: &str = "SCOPEGRAPH_CACHE_SIZE";

/// Environment variable overriding [`ResolverConfig::disable_cache`]
pub const ENV_DISABLE_CACHE: &str = "SCOPEGRAPH_DISABLE_CACHE";

/// Environment variable overriding [`ResolverConfig::shuffle_traversal`]
pub const ENV_SHUFFLE_TRAVERSAL: &str = "SCOPEGRAPH_SHUFFLE_TRAVERSAL";

/// Environment variable overriding [`ResolverConfig::reload_interval_secs`]
pub const ENV_RELOAD_INTERVAL: &str = "SCOPEGRAPH_RELOAD_INTERVAL_SECS";

/// Scope resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Maximum number of cached set expansions
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Turn the expansion cache off
    #[serde(default)]
    pub disable_cache: bool,

    /// Randomize the order of fixed-point traversal roots
    #[serde(default = "default_true")]
    pub shuffle_traversal: bool,

    /// Seconds between full reloads done by
    /// [`ScopeResolver::spawn_periodic_reload`](crate::ScopeResolver::spawn_periodic_reload)
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

fn default_true() -> bool { true }
fn default_cache_capacity() -> usize { 10_000 }
fn default_reload_interval() -> u64 { 20 * 60 }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            disable_cache: false,
            shuffle_traversal: default_true(),
            reload_interval_secs: default_reload_interval(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overlaid with `SCOPEGRAPH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_CACHE_SIZE) {
            config.cache_capacity = value.trim().parse().map_err(|_| {
                AuthzError::Config(format!("{ENV_CACHE_SIZE} must be a number, got '{value}'"))
            })?;
        }
        if let Some(value) = lookup(ENV_DISABLE_CACHE) {
            config.disable_cache = parse_flag(ENV_DISABLE_CACHE, &value)?;
        }
        if let Some(value) = lookup(ENV_SHUFFLE_TRAVERSAL) {
            config.shuffle_traversal = parse_flag(ENV_SHUFFLE_TRAVERSAL, &value)?;
        }
        if let Some(value) = lookup(ENV_RELOAD_INTERVAL) {
            config.reload_interval_secs = value.trim().parse().map_err(|_| {
                AuthzError::Config(format!("{ENV_RELOAD_INTERVAL} must be a number, got '{value}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.disable_cache && self.cache_capacity == 0 {
            return Err(AuthzError::Config(
                "cache_capacity must be non-zero unless the cache is disabled".to_string(),
            ));
        }

        if self.reload_interval_secs == 0 {
            return Err(AuthzError::Config(
                "reload_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Period of the background full reload
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    /// Whether expansions are cached
    pub fn cache_enabled(&self) -> bool {
        !self.disable_cache && self.cache_capacity > 0
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AuthzError::Config(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}
