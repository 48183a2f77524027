//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL_SECS;
use crate::error::{Error, Result};

/// Default generation model.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Longest accepted cache TTL (one week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for [`MemoryEngine`](crate::engine::MemoryEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file; `None` keeps everything in memory
    pub database_path: Option<String>,
    /// Lifetime of cached query results in seconds
    pub cache_ttl_secs: u64,
    pub default_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Minimum strength for a learned memory connection to be kept
    pub connection_threshold: f64,
    /// Cap on memories ranked into a single request
    pub max_active_memories: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_ttl_secs: DEFAULT_TTL_SECS as u64,
            default_model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.8,
            connection_threshold: 0.3,
            max_active_memories: 20,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `NARRATIVE_MEMORY_DB`,
    /// `NARRATIVE_MEMORY_CACHE_TTL` and `NARRATIVE_MEMORY_MODEL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var("NARRATIVE_MEMORY_DB")
                .ok()
                .filter(|s| !s.is_empty()),
            cache_ttl_secs: std::env::var("NARRATIVE_MEMORY_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_ttl_secs),
            default_model: std::env::var("NARRATIVE_MEMORY_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.default_model),
            ..defaults
        }
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_connection_threshold(mut self, threshold: f64) -> Self {
        self.connection_threshold = threshold;
        self
    }

    pub fn with_max_active_memories(mut self, max: usize) -> Self {
        self.max_active_memories = max;
        self
    }

    /// Cache TTL, capped at [`MAX_CACHE_TTL_SECS`].
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.connection_threshold) {
            return Err(Error::Config(format!(
                "connection_threshold must be within [0, 1], got {}",
                self.connection_threshold
            )));
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(Error::Config(format!(
                "cache_ttl_secs must be at most {}, got {}",
                MAX_CACHE_TTL_SECS, self.cache_ttl_secs
            )));
        }
        if self.default_model.is_empty() {
            return Err(Error::Config("default_model must not be empty".to_string()));
        }
        Ok(())
    }
}
