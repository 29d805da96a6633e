//! Dishdash view cache.
//!
//! Read models (order detail, order lists, status dashboards) are cached in a
//! key-value store shared by every API instance:
//!
//! - **Keys** are canonical strings built from the view and its parameters.
//! - **Groups** are store-side sets naming the keys that go stale together.
//! - **Writes** to orders execute an `InvalidationPlan` before they return.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `dishdash.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! redis_url = "redis://127.0.0.1/"
//! detail_ttl_secs = 1800
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
mod lock;
mod planner;
mod read_through;
mod redis_store;
mod registry;
mod store;

use std::sync::Arc;

use tracing::warn;

pub use config::{CacheBackend, CacheConfig};
pub use keys::{CacheKey, GroupKey, ViewKind, ViewQuery};
pub use planner::InvalidationPlan;
pub use read_through::{Lookup, ReadThroughCache};
pub use redis_store::RedisStore;
pub use registry::{Generations, InvalidationRegistry, InvalidationReport};
pub use store::{CacheError, CacheStore, MemoryStore, NullStore, ScanPage, glob_match};

/// Open the configured backend.
///
/// An unreachable Redis does not stop startup: the cache is bypassed and
/// every read goes to the database.
pub async fn open_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    if !config.enabled {
        return Arc::new(NullStore);
    }

    match config.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new(config)),
        CacheBackend::Redis => {
            let Some(url) = config.redis_url.as_deref() else {
                warn!(
                    target = "dishdash::cache",
                    "cache.backend is redis but cache.redis_url is unset; cache bypassed"
                );
                return Arc::new(NullStore);
            };
            match RedisStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    warn!(
                        target = "dishdash::cache",
                        error = %err,
                        "Redis cache store unreachable; cache bypassed"
                    );
                    Arc::new(NullStore)
                }
            }
        }
    }
}

/// Cache components wired over one store.
#[derive(Clone)]
pub struct CacheLayer {
    pub registry: Arc<InvalidationRegistry>,
    pub reads: Arc<ReadThroughCache>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        let registry = Arc::new(InvalidationRegistry::new(store.clone(), config.clone()));
        let reads = Arc::new(ReadThroughCache::new(store, registry.clone(), config));
        Self { registry, reads }
    }

    pub async fn open(config: &CacheConfig) -> Self {
        let store = open_store(config).await;
        Self::new(store, config.clone())
    }
}
