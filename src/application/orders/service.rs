use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use crate::application::notify::{
    CancellationMessage, DeliveryPolicy, NotificationDispatcher, NotifyError,
};
use crate::application::orders::types::{OrderStatusError, TransitionCommand};
use crate::application::repos::{
    OrdersRepo, OrdersWriteRepo, RepoError, UpdateOrderStatusParams,
};
use crate::cache::{InvalidationPlan, InvalidationRegistry};
use crate::domain::entities::OrderRecord;
use crate::domain::orders::{TransitionPlan, plan_transition};
use crate::domain::types::OrderStatus;

/// Applies status changes to orders.
///
/// A cancellation is committed before the customer is notified. When the
/// notice cannot be delivered the previous state is written back, so an
/// order is never left cancelled without its customer being told.
#[derive(Clone)]
pub struct OrderStatusService {
    reader: Arc<dyn OrdersRepo>,
    writer: Arc<dyn OrdersWriteRepo>,
    notifier: Arc<dyn NotificationDispatcher>,
    invalidator: Arc<InvalidationRegistry>,
    delivery: DeliveryPolicy,
}

impl OrderStatusService {
    pub fn new(
        reader: Arc<dyn OrdersRepo>,
        writer: Arc<dyn OrdersWriteRepo>,
        notifier: Arc<dyn NotificationDispatcher>,
        invalidator: Arc<InvalidationRegistry>,
        delivery: DeliveryPolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            notifier,
            invalidator,
            delivery,
        }
    }

    #[instrument(skip(self, command), fields(order_id = command.order_id))]
    pub async fn transition(
        &self,
        command: TransitionCommand,
    ) -> Result<OrderRecord, OrderStatusError> {
        let result = self.apply(command).await;
        let outcome = match &result {
            Ok(_) => None,
            Err(OrderStatusError::Conflict(_)) => Some("conflict"),
            Err(OrderStatusError::Notification(_)) => Some("compensated"),
            Err(OrderStatusError::NotificationUncompensated { .. }) => Some("uncompensated"),
            Err(err) if err.is_downstream() => Some("failed"),
            Err(_) => Some("rejected"),
        };
        if let Some(outcome) = outcome {
            counter!("dishdash_order_transition_total", "outcome" => outcome).increment(1);
        }
        result
    }

    async fn apply(&self, command: TransitionCommand) -> Result<OrderRecord, OrderStatusError> {
        let order_id = command.order_id;
        if order_id <= 0 {
            return Err(OrderStatusError::Validation(
                "order id must be a positive integer".to_string(),
            ));
        }
        let requested = OrderStatus::resolve(&command.status)
            .ok_or_else(|| OrderStatusError::UnknownStatus(command.status.clone()))?;

        let current = self
            .reader
            .find_by_id(order_id)
            .await?
            .ok_or(OrderStatusError::NotFound(order_id))?;

        let plan = plan_transition(
            current.status,
            current.paid,
            requested,
            command.cancel_reason.as_deref(),
        )?;

        let params = match &plan {
            TransitionPlan::NoOp => {
                debug!(status = %current.status, "Order already in requested status");
                counter!("dishdash_order_transition_total", "outcome" => "noop").increment(1);
                return Ok(current);
            }
            TransitionPlan::Advance { to, paid, .. } => UpdateOrderStatusParams {
                id: order_id,
                expected_version: current.version,
                status: *to,
                paid: *paid,
                cancel_reason: None,
            },
            TransitionPlan::Cancel { reason, paid, .. } => UpdateOrderStatusParams {
                id: order_id,
                expected_version: current.version,
                status: OrderStatus::Cancelled,
                paid: *paid,
                cancel_reason: Some(reason.clone()),
            },
        };

        let updated = self
            .writer
            .update_order_status(params)
            .await
            .map_err(|err| map_write_error(order_id, err))?;

        if let TransitionPlan::Cancel { reason, paid, .. } = &plan {
            let message = CancellationMessage {
                order_id,
                to_address: &current.customer_email,
                reason: reason.as_str(),
                was_paid: *paid,
            };
            if let Err(err) = self.deliver(message).await {
                let restored = self.restore(&current, &updated).await;
                self.invalidate(&updated).await;
                return Err(match restored {
                    Ok(_) => OrderStatusError::Notification(err),
                    Err(restore) => OrderStatusError::NotificationUncompensated {
                        order_id,
                        notify: err,
                        restore,
                    },
                });
            }
        }

        self.invalidate(&updated).await;

        let outcome = match plan {
            TransitionPlan::Cancel { .. } => "cancelled",
            _ => "advanced",
        };
        counter!("dishdash_order_transition_total", "outcome" => outcome).increment(1);
        info!(
            from = %current.status,
            to = %updated.status,
            paid = updated.paid,
            version = updated.version,
            "Order status changed"
        );
        Ok(updated)
    }

    /// Send the cancellation notice under the delivery policy.
    async fn deliver(&self, message: CancellationMessage<'_>) -> Result<(), NotifyError> {
        let attempts = self.delivery.max_attempts.get();
        let mut last_error = NotifyError::Transport("no delivery attempted".to_string());

        for attempt in 1..=attempts {
            let sent = tokio::time::timeout(
                self.delivery.timeout,
                self.notifier.send_cancellation(message),
            )
            .await;
            match sent {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => last_error = err,
                Err(_) => last_error = NotifyError::Timeout(self.delivery.timeout),
            }
            warn!(
                attempt,
                max_attempts = attempts,
                error = %last_error,
                "Cancellation notice failed"
            );
            if attempt < attempts {
                tokio::time::sleep(self.delivery.backoff * attempt).await;
            }
        }
        Err(last_error)
    }

    /// Write `previous` back over the cancellation committed as `committed`.
    async fn restore(
        &self,
        previous: &OrderRecord,
        committed: &OrderRecord,
    ) -> Result<OrderRecord, RepoError> {
        let params = UpdateOrderStatusParams {
            id: previous.id,
            expected_version: committed.version,
            status: previous.status,
            paid: previous.paid,
            cancel_reason: previous.cancel_reason.clone(),
        };
        match self.writer.update_order_status(params).await {
            Ok(restored) => {
                warn!(
                    status = %restored.status,
                    version = restored.version,
                    "Cancellation rolled back after notification failure"
                );
                Ok(restored)
            }
            Err(err) => {
                error!(
                    error = %err,
                    previous_version = previous.version,
                    committed_version = committed.version,
                    "Failed to roll back cancellation; order stays cancelled without notice"
                );
                Err(err)
            }
        }
    }

    async fn invalidate(&self, order: &OrderRecord) {
        let plan = InvalidationPlan::for_order(order, self.invalidator.prefix());
        let report = self.invalidator.execute(&plan).await;
        debug!(
            keys_deleted = report.keys_deleted,
            failures = report.failures,
            "Invalidated cached order views"
        );
    }
}

fn map_write_error(order_id: i64, err: RepoError) -> OrderStatusError {
    match err {
        RepoError::NotFound => OrderStatusError::NotFound(order_id),
        other => OrderStatusError::from(other),
    }
}
