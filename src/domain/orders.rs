//! Order lifecycle rules.
//!
//! The set of legal moves is kept as a table rather than spread across
//! conditionals, so it can be enumerated and tested directly.

use crate::domain::error::DomainError;
use crate::domain::types::OrderStatus;

/// Allowed next statuses for each status.
static TRANSITIONS: [(OrderStatus, &[OrderStatus]); 6] = [
    (
        OrderStatus::OrderPlaced,
        &[OrderStatus::OrderConfirmed, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::OrderConfirmed,
        &[OrderStatus::OrderProcessing, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::OrderProcessing,
        &[OrderStatus::Shipping, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Shipping,
        &[OrderStatus::Delivered, OrderStatus::Cancelled],
    ),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
];

pub fn allowed_next(status: OrderStatus) -> &'static [OrderStatus] {
    TRANSITIONS
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

/// What a transition request resolves to, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Requested status equals the current one.
    NoOp,
    /// Move one stage forward on the lifecycle path.
    Advance {
        from: OrderStatus,
        to: OrderStatus,
        paid: bool,
    },
    /// Move to `Cancelled`; `paid` is carried over unchanged.
    Cancel {
        from: OrderStatus,
        reason: String,
        paid: bool,
    },
}

/// Decide how an order in `current` reacts to a request for `requested`.
///
/// A non-cancel request only signals "advance": the order moves exactly one
/// stage forward whatever stage was named.
pub fn plan_transition(
    current: OrderStatus,
    paid: bool,
    requested: OrderStatus,
    cancel_reason: Option<&str>,
) -> Result<TransitionPlan, DomainError> {
    let allowed = allowed_next(current);

    if requested == OrderStatus::Cancelled {
        if !allowed.contains(&OrderStatus::Cancelled) {
            return Err(DomainError::invalid_transition(current, requested));
        }
        let reason = cancel_reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .ok_or_else(|| DomainError::validation("cancel_reason is required to cancel"))?;
        return Ok(TransitionPlan::Cancel {
            from: current,
            reason: reason.to_string(),
            paid,
        });
    }

    if requested == current {
        return Ok(TransitionPlan::NoOp);
    }

    let to = allowed
        .iter()
        .copied()
        .find(|status| *status != OrderStatus::Cancelled)
        .ok_or_else(|| DomainError::invalid_transition(current, requested))?;

    Ok(TransitionPlan::Advance {
        from: current,
        to,
        paid: paid || to == OrderStatus::Delivered,
    })
}

/// Customer-facing message sent when an order is cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationNotice {
    pub subject: String,
    pub body: String,
}

impl CancellationNotice {
    pub fn compose(order_id: i64, reason: &str, was_paid: bool) -> Self {
        let subject = format!("Your order #{order_id} has been cancelled");
        let settlement = if was_paid {
            "Your payment will be refunded to the original payment method within 5-7 business days."
        } else {
            "No payment was taken for this order."
        };
        let body = format!(
            "Hello,\n\nYour order #{order_id} has been cancelled.\nReason: {reason}\n\n{settlement}\n"
        );
        Self { subject, body }
    }
}
