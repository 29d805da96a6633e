//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of an order (mirrors Postgres enum `order_status`).
///
/// Declaration order is the only valid forward path; `Cancelled` sits outside
/// of it and is reachable from every non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    OrderPlaced,
    OrderConfirmed,
    OrderProcessing,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every status, forward path first.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::OrderPlaced,
        OrderStatus::OrderConfirmed,
        OrderStatus::OrderProcessing,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// The forward path, in order.
    pub const FORWARD: [OrderStatus; 5] = [
        OrderStatus::OrderPlaced,
        OrderStatus::OrderConfirmed,
        OrderStatus::OrderProcessing,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::OrderPlaced => "order_placed",
            OrderStatus::OrderConfirmed => "order_confirmed",
            OrderStatus::OrderProcessing => "order_processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Human-facing label, as stored in the `order_statuses` reference table.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::OrderPlaced => "Order Placed",
            OrderStatus::OrderConfirmed => "Order Confirmed",
            OrderStatus::OrderProcessing => "Order Processing",
            OrderStatus::Shipping => "Shipping",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Position on the forward path; `None` for `Cancelled`.
    pub fn position(self) -> Option<usize> {
        Self::FORWARD.iter().position(|status| *status == self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The next stage on the forward path, if any.
    pub fn next(self) -> Option<OrderStatus> {
        self.position()
            .and_then(|index| Self::FORWARD.get(index + 1).copied())
    }

    /// Resolve a client-supplied status name.
    ///
    /// Matching ignores case, spaces, underscores and hyphens so that
    /// `"Order Confirmed"`, `"order_confirmed"` and `"OrderConfirmed"` agree.
    pub fn resolve(name: &str) -> Option<OrderStatus> {
        let wanted = fold_name(name);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|status| fold_name(status.as_str()) == wanted)
    }
}

fn fold_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
