//! Read-through cache manager.
//!
//! Serves cached views, computes and stores them on a miss, and tracks each
//! stored key in its invalidation groups. Store failures never reach the
//! caller: they are logged and the read falls back to computing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, GroupKey, ViewKind, ViewQuery};
use super::registry::{Generations, InvalidationRegistry};
use super::store::{CacheError, CacheStore};

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
}

pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    registry: Arc<InvalidationRegistry>,
    config: CacheConfig,
}

impl ReadThroughCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        registry: Arc<InvalidationRegistry>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<InvalidationRegistry> {
        &self.registry
    }

    pub fn key_for(&self, query: &ViewQuery) -> CacheKey {
        query.cache_key(&self.config.key_prefix)
    }

    /// Default TTL for a view.
    pub fn ttl_for(&self, view: ViewKind) -> Duration {
        match view {
            ViewKind::Order => self.config.detail_ttl(),
            ViewKind::CustomerOrders | ViewKind::Orders => self.config.list_ttl(),
            ViewKind::OrderStats => self.config.stats_ttl(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, query: &ViewQuery) -> Lookup<T> {
        if !self.config.enabled {
            return Lookup::Miss;
        }

        let view = query.view().as_str();
        let key = self.key_for(query);
        let bytes = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                counter!("dishdash_cache_miss_total", "view" => view).increment(1);
                return Lookup::Miss;
            }
            Err(err) => {
                self.record_error("get", &key, &err);
                counter!("dishdash_cache_miss_total", "view" => view).increment(1);
                return Lookup::Miss;
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => {
                counter!("dishdash_cache_hit_total", "view" => view).increment(1);
                Lookup::Hit(value)
            }
            Err(err) => {
                warn!(
                    target = "dishdash::cache::read_through",
                    key = %key,
                    error = %err,
                    "Discarding undecodable cache entry"
                );
                counter!("dishdash_cache_error_total", "op" => "decode").increment(1);
                counter!("dishdash_cache_miss_total", "view" => view).increment(1);
                if let Err(err) = self.store.delete(&[key.as_str().to_string()]).await {
                    self.record_error("delete", &key, &err);
                }
                Lookup::Miss
            }
        }
    }

    /// Store `value` under the query's key and track it in `groups`.
    ///
    /// With a `snapshot`, the write is skipped when any group was invalidated
    /// after the snapshot was taken.
    pub async fn populate<T: Serialize>(
        &self,
        query: &ViewQuery,
        value: &T,
        ttl: Duration,
        groups: &[GroupKey],
        snapshot: Option<&Generations>,
    ) {
        if !self.config.enabled {
            return;
        }

        let key = self.key_for(query);
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    target = "dishdash::cache::read_through",
                    key = %key,
                    error = %err,
                    "Failed to encode cache entry"
                );
                counter!("dishdash_cache_error_total", "op" => "encode").increment(1);
                return;
            }
        };

        if let Some(snapshot) = snapshot {
            match self.registry.has_moved(snapshot).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!(
                        target = "dishdash::cache::read_through",
                        key = %key,
                        "Skipping populate; group invalidated during compute"
                    );
                    return;
                }
                Err(err) => {
                    self.record_error("generation", &key, &err);
                    return;
                }
            }
        }

        // Membership goes in before the value so an invalidation can never
        // miss a stored key.
        for group in groups {
            if let Err(err) = self.registry.track(group, &key).await {
                self.record_error("track", &key, &err);
                return;
            }
        }

        if let Err(err) = self.store.set(key.as_str(), &payload, ttl).await {
            self.record_error("set", &key, &err);
        }
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// The boolean reports whether the value came from the cache. Errors from
    /// `compute` are returned unchanged and nothing is stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        query: &ViewQuery,
        ttl: Duration,
        groups: &[GroupKey],
        compute: F,
    ) -> Result<(T, bool), E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Lookup::Hit(value) = self.get::<T>(query).await {
            return Ok((value, true));
        }

        let snapshot = if self.config.enabled {
            match self.registry.generations(groups).await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    self.record_error("generation", &self.key_for(query), &err);
                    None
                }
            }
        } else {
            None
        };

        let value = compute().await?;

        if let Some(snapshot) = snapshot.as_ref() {
            self.populate(query, &value, ttl, groups, Some(snapshot))
                .await;
        }
        Ok((value, false))
    }

    fn record_error(&self, op: &'static str, key: &CacheKey, err: &CacheError) {
        counter!("dishdash_cache_error_total", "op" => op).increment(1);
        warn!(
            target = "dishdash::cache::read_through",
            op,
            key = %key,
            error = %err,
            "Cache store unavailable; serving without cache"
        );
    }
}
