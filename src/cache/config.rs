//! Cache configuration.
//!
//! Controls the shared view cache via the `[cache]` section of `dishdash.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_KEY_PREFIX: &str = "dishdash";
const DEFAULT_DETAIL_TTL_SECS: u64 = 30 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 5 * 60;
const DEFAULT_STATS_TTL_SECS: u64 = 2 * 60;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_SCAN_BATCH: usize = 500;

/// Which key-value service backs the view cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local store; suitable for a single instance and for tests.
    Memory,
    /// Shared Redis instance.
    Redis,
}

/// Cache configuration from `dishdash.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off every read is a miss and nothing is stored.
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Connection URL for the Redis backend.
    pub redis_url: Option<String>,
    /// Namespace prepended to every key.
    pub key_prefix: String,
    /// TTL for single-order views.
    pub detail_ttl_secs: u64,
    /// TTL for paginated order lists.
    pub list_ttl_secs: u64,
    /// TTL for status-count dashboards.
    pub stats_ttl_secs: u64,
    /// Maximum entries held by the memory backend.
    pub memory_capacity: usize,
    /// Keys requested per SCAN round and per DEL batch.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            list_ttl_secs: DEFAULT_LIST_TTL_SECS,
            stats_ttl_secs: DEFAULT_STATS_TTL_SECS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            detail_ttl_secs: settings.detail_ttl.as_secs(),
            list_ttl_secs: settings.list_ttl.as_secs(),
            stats_ttl_secs: settings.stats_ttl.as_secs(),
            memory_capacity: settings.memory_capacity.get(),
            scan_batch: settings.scan_batch.get(),
        }
    }
}

impl CacheConfig {
    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs.max(1))
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs.max(1))
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs.max(1))
    }

    /// Lifetime of group generation tokens; outlives every view TTL.
    pub fn generation_ttl(&self) -> Duration {
        let longest = self
            .detail_ttl_secs
            .max(self.list_ttl_secs)
            .max(self.stats_ttl_secs)
            .max(1);
        Duration::from_secs(longest.saturating_mul(2))
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn scan_batch_non_zero(&self) -> usize {
        self.scan_batch.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.key_prefix, "dishdash");
        assert_eq!(config.detail_ttl(), Duration::from_secs(1800));
        assert_eq!(config.list_ttl(), Duration::from_secs(300));
        assert_eq!(config.stats_ttl(), Duration::from_secs(120));
        assert_eq!(config.scan_batch, 500);
    }

    #[test]
    fn generation_ttl_outlives_views() {
        let config = CacheConfig::default();
        assert_eq!(config.generation_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn zero_values_clamp() {
        let config = CacheConfig {
            detail_ttl_secs: 0,
            memory_capacity: 0,
            scan_batch: 0,
            ..Default::default()
        };
        assert_eq!(config.detail_ttl(), Duration::from_secs(1));
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
        assert_eq!(config.scan_batch_non_zero(), 1);
    }
}
