//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::domain::entities::{OrderRecord, OrderStatusCount, OrderStatusRecord};
use crate::domain::types::OrderStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("order {id} changed since version {expected_version} was read")]
    Conflict { id: i64, expected_version: i64 },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl OrderSort {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSort::NewestFirst => "newest_first",
            OrderSort::OldestFirst => "oldest_first",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "newest_first" | "newest" | "desc" => Some(OrderSort::NewestFirst),
            "oldest_first" | "oldest" | "asc" => Some(OrderSort::OldestFirst),
            _ => None,
        }
    }
}

/// Listing filter; `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQueryFilter {
    pub customer_id: Option<i64>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of the customer email.
    pub search: Option<String>,
    /// Inclusive bounds on the order's creation date (UTC).
    pub placed_from: Option<Date>,
    pub placed_to: Option<Date>,
    pub sort: OrderSort,
    pub page: u32,
    pub per_page: u32,
}

impl Default for OrderQueryFilter {
    fn default() -> Self {
        Self {
            customer_id: None,
            status: None,
            search: None,
            placed_from: None,
            placed_to: None,
            sort: OrderSort::default(),
            page: 1,
            per_page: 20,
        }
    }
}

impl OrderQueryFilter {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub items: Vec<OrderRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Versioned status write. Applies only while the row is at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOrderStatusParams {
    pub id: i64,
    pub expected_version: i64,
    pub status: OrderStatus,
    pub paid: bool,
    pub cancel_reason: Option<String>,
}

#[async_trait]
pub trait OrdersRepo: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<OrderRecord>, RepoError>;

    async fn list_orders(&self, filter: &OrderQueryFilter) -> Result<OrderPage, RepoError>;

    /// Count per status; every status appears, zero counts included.
    async fn count_by_status(&self) -> Result<Vec<OrderStatusCount>, RepoError>;

    async fn list_statuses(&self) -> Result<Vec<OrderStatusRecord>, RepoError>;
}

#[async_trait]
pub trait OrdersWriteRepo: Send + Sync {
    /// Apply a status write, returning the row with its new version.
    ///
    /// Fails with `RepoError::Conflict` when the row moved past
    /// `expected_version` and with `RepoError::NotFound` when it is gone.
    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_aliases() {
        assert_eq!(OrderSort::parse("Newest"), Some(OrderSort::NewestFirst));
        assert_eq!(OrderSort::parse("asc"), Some(OrderSort::OldestFirst));
        assert_eq!(OrderSort::parse("random"), None);
    }

    #[test]
    fn offset_is_page_based() {
        let filter = OrderQueryFilter {
            page: 3,
            per_page: 10,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 20);
        let first = OrderQueryFilter {
            page: 0,
            ..Default::default()
        };
        assert_eq!(first.offset(), 0);
    }
}
