//! Invalidation plan generation.
//!
//! Maps a committed order write to the groups and key patterns whose cached
//! views it makes stale.

use std::collections::BTreeSet;
use std::fmt;

use super::keys::{GroupKey, ViewKind};
use crate::domain::entities::OrderRecord;

/// Groups and patterns to invalidate after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Tracked groups to clear.
    pub groups: BTreeSet<GroupKey>,
    /// Globs for views that are never group-tracked.
    pub patterns: BTreeSet<String>,
}

impl InvalidationPlan {
    /// Everything a change to `order` can affect: its detail view, its
    /// customer's lists, the cross-customer listings and the dashboards.
    pub fn for_order(order: &OrderRecord, prefix: &str) -> Self {
        let mut plan = Self::default();
        plan.groups.insert(GroupKey::Order(order.id));
        plan.groups.insert(GroupKey::CustomerOrders(order.customer_id));
        plan.groups.insert(GroupKey::OrderIndex);
        plan.patterns.insert(ViewKind::OrderStats.pattern(prefix));
        plan
    }
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ groups: {}, patterns: {} }}",
            self.groups.len(),
            self.patterns.len()
        )
    }
}
