//! Invalidation group registry.
//!
//! Groups are sets held in the cache store itself, so every instance sharing
//! the store sees the same membership. Each group also carries a generation
//! token that changes on every invalidation; readers compare it before and
//! after computing a value and skip the write when it moved.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::CacheConfig;
use super::keys::{CacheKey, GroupKey};
use super::planner::InvalidationPlan;
use super::store::{CacheError, CacheStore};

/// Outcome of an invalidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys_deleted: u64,
    /// Store operations that failed and were skipped.
    pub failures: u32,
}

impl InvalidationReport {
    fn absorb(&mut self, other: InvalidationReport) {
        self.keys_deleted += other.keys_deleted;
        self.failures += other.failures;
    }
}

/// Generation tokens of a set of groups, taken at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generations(Vec<(GroupKey, Option<String>)>);

pub struct InvalidationRegistry {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl InvalidationRegistry {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Record that `key` belongs to `group`.
    ///
    /// The group set outlives every member's TTL, so a group whose entity is
    /// never written again still ages out.
    pub async fn track(&self, group: &GroupKey, key: &CacheKey) -> Result<(), CacheError> {
        self.store
            .set_add(
                &group.set_key(self.prefix()),
                key.as_str(),
                self.config.generation_ttl(),
            )
            .await
    }

    /// Read the current generation of each group.
    pub async fn generations(&self, groups: &[GroupKey]) -> Result<Generations, CacheError> {
        let mut tokens = Vec::with_capacity(groups.len());
        for group in groups {
            let raw = self.store.get(&group.generation_key(self.prefix())).await?;
            let token = raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            tokens.push((*group, token));
        }
        Ok(Generations(tokens))
    }

    /// Whether any group in `snapshot` has been invalidated since it was taken.
    pub async fn has_moved(&self, snapshot: &Generations) -> Result<bool, CacheError> {
        let groups: Vec<GroupKey> = snapshot.0.iter().map(|(group, _)| *group).collect();
        let current = self.generations(&groups).await?;
        Ok(current != *snapshot)
    }

    /// Delete every key tracked under `group`, then the group itself.
    pub async fn invalidate_group(&self, group: &GroupKey) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        if !self.config.enabled {
            return report;
        }

        let prefix = self.prefix();
        let token = Uuid::new_v4().to_string();
        if let Err(err) = self
            .store
            .set(
                &group.generation_key(prefix),
                token.as_bytes(),
                self.config.generation_ttl(),
            )
            .await
        {
            self.record_failure("bump_generation", &err, &mut report);
        }

        let set_key = group.set_key(prefix);
        let members = match self.store.set_members(&set_key).await {
            Ok(members) => members,
            Err(err) => {
                self.record_failure("set_members", &err, &mut report);
                return report;
            }
        };

        for chunk in members.chunks(self.config.scan_batch_non_zero()) {
            match self.store.delete(chunk).await {
                Ok(deleted) => report.keys_deleted += deleted,
                Err(err) => self.record_failure("delete", &err, &mut report),
            }
        }
        if let Err(err) = self.store.delete(&[set_key]).await {
            self.record_failure("delete_group", &err, &mut report);
        }

        debug!(
            target = "dishdash::cache::registry",
            group = %group,
            deleted = report.keys_deleted,
            "Invalidated cache group"
        );
        report
    }

    /// Delete every key matching `pattern`, walking the keyspace with SCAN.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        if !self.config.enabled {
            return report;
        }

        let batch = self.config.scan_batch_non_zero();
        let mut cursor = 0;
        loop {
            let page = match self.store.scan(pattern, cursor, batch).await {
                Ok(page) => page,
                Err(err) => {
                    self.record_failure("scan", &err, &mut report);
                    break;
                }
            };
            if !page.keys.is_empty() {
                match self.store.delete(&page.keys).await {
                    Ok(deleted) => report.keys_deleted += deleted,
                    Err(err) => self.record_failure("delete", &err, &mut report),
                }
            }
            cursor = page.next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(
            target = "dishdash::cache::registry",
            pattern,
            deleted = report.keys_deleted,
            "Invalidated cache pattern"
        );
        report
    }

    /// Run a plan: groups first, then patterns.
    pub async fn execute(&self, plan: &InvalidationPlan) -> InvalidationReport {
        let started = Instant::now();
        let mut report = InvalidationReport::default();

        for group in &plan.groups {
            report.absorb(self.invalidate_group(group).await);
        }
        for pattern in &plan.patterns {
            report.absorb(self.invalidate_by_pattern(pattern).await);
        }

        counter!("dishdash_cache_invalidated_keys_total").increment(report.keys_deleted);
        histogram!("dishdash_cache_invalidate_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        if report.failures > 0 {
            warn!(
                target = "dishdash::cache::registry",
                plan = %plan,
                failures = report.failures,
                "Cache invalidation incomplete; stale entries expire by TTL"
            );
        }
        report
    }

    fn record_failure(&self, op: &'static str, err: &CacheError, report: &mut InvalidationReport) {
        report.failures += 1;
        counter!("dishdash_cache_error_total", "op" => op).increment(1);
        warn!(
            target = "dishdash::cache::registry",
            op,
            error = %err,
            "Cache store operation failed during invalidation"
        );
    }
}
