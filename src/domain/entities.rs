//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::OrderStatus;

/// An order as stored in the `orders` table.
///
/// `version` increases by one on every committed write and guards
/// read-modify-write cycles against concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub customer_id: i64,
    pub customer_email: String,
    pub status: OrderStatus,
    pub paid: bool,
    pub cancel_reason: Option<String>,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl OrderRecord {
    /// Check the paid/cancellation invariants of a persisted order.
    pub fn is_consistent(&self) -> bool {
        let reason_ok = match self.status {
            OrderStatus::Cancelled => self
                .cancel_reason
                .as_deref()
                .is_some_and(|reason| !reason.trim().is_empty()),
            _ => self.cancel_reason.is_none(),
        };
        let paid_ok = self.status != OrderStatus::Delivered || self.paid;
        reason_ok && paid_ok
    }
}

/// Row of the `order_statuses` reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusRecord {
    pub status: OrderStatus,
    pub label: String,
    pub position: i32,
}

/// Number of orders currently in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusCount {
    pub status: OrderStatus,
    pub count: u64,
}
