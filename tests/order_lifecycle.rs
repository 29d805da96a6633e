mod common;

use std::sync::Arc;

use common::{FailingDispatcher, Harness, InMemoryOrders, RecordingDispatcher, order};
use dishdash::application::orders::{OrderStatusError, TransitionCommand};
use dishdash::domain::types::OrderStatus;

fn command(order_id: i64, status: &str, reason: Option<&str>) -> TransitionCommand {
    TransitionCommand {
        order_id,
        status: status.to_string(),
        cancel_reason: reason.map(str::to_string),
    }
}

#[tokio::test]
async fn order_walks_the_forward_path_one_step_per_call() {
    let orders = InMemoryOrders::with_orders([order(42, 7, OrderStatus::OrderPlaced, false)]);
    let notifier = Arc::new(RecordingDispatcher::default());
    let harness = Harness::new(orders.clone(), notifier.clone());

    let confirmed = harness
        .statuses
        .transition(command(42, "Order Confirmed", None))
        .await
        .expect("confirm");
    assert_eq!(confirmed.status, OrderStatus::OrderConfirmed);
    assert_eq!(confirmed.version, 2);

    // Any non-cancel target only means "advance".
    let processing = harness
        .statuses
        .transition(command(42, "delivered", None))
        .await
        .expect("advance");
    assert_eq!(processing.status, OrderStatus::OrderProcessing);
    assert!(!processing.paid);

    let shipping = harness
        .statuses
        .transition(command(42, "shipping", None))
        .await
        .expect("ship");
    assert_eq!(shipping.status, OrderStatus::Shipping);

    let delivered = harness
        .statuses
        .transition(command(42, "DELIVERED", None))
        .await
        .expect("deliver");
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.paid, "delivery marks the order paid");
    assert!(delivered.is_consistent());

    let err = harness
        .statuses
        .transition(command(42, "cancelled", Some("too late")))
        .await
        .expect_err("delivered is terminal");
    assert!(matches!(
        err,
        OrderStatusError::InvalidTransition {
            from: OrderStatus::Delivered,
            requested: OrderStatus::Cancelled,
        }
    ));
    assert!(notifier.sent().is_empty());
    assert_eq!(orders.get(42).map(|o| o.version), Some(5));
}

#[tokio::test]
async fn confirmed_order_cancelled_then_frozen() {
    let orders = InMemoryOrders::with_orders([order(42, 7, OrderStatus::OrderPlaced, false)]);
    let notifier = Arc::new(RecordingDispatcher::default());
    let harness = Harness::new(orders.clone(), notifier.clone());

    let confirmed = harness
        .statuses
        .transition(command(42, "Order Confirmed", None))
        .await
        .expect("confirm");
    assert_eq!(confirmed.status, OrderStatus::OrderConfirmed);

    let cancelled = harness
        .statuses
        .transition(command(42, "Cancelled", Some("Out of stock")))
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Out of stock"));
    assert!(!cancelled.paid);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reason, "Out of stock");
    assert!(!sent[0].was_paid);

    let warm = harness.queries.order_detail(42).await.expect("detail");
    assert!(!warm.cached);
    let writes = orders.writes();

    let err = harness
        .statuses
        .transition(command(42, "Shipping", None))
        .await
        .expect_err("cancelled is terminal");
    assert!(matches!(
        err,
        OrderStatusError::InvalidTransition {
            from: OrderStatus::Cancelled,
            requested: OrderStatus::Shipping,
        }
    ));
    assert_eq!(orders.writes(), writes);
    assert_eq!(notifier.sent().len(), 1);

    let after = harness.queries.order_detail(42).await.expect("detail");
    assert!(after.cached, "rejected request leaves cached views alone");
    assert_eq!(after.value.status, OrderStatus::Cancelled);
    assert_eq!(after.value.version, 3);
}

#[tokio::test]
async fn cancelling_notifies_the_customer_once() {
    let orders = InMemoryOrders::with_orders([order(42, 7, OrderStatus::OrderConfirmed, true)]);
    let notifier = Arc::new(RecordingDispatcher::default());
    let harness = Harness::new(orders.clone(), notifier.clone());

    let cancelled = harness
        .statuses
        .transition(command(42, "Cancelled", Some("  kitchen closed ")))
        .await
        .expect("cancel");

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("kitchen closed"));
    assert!(cancelled.paid, "paid flag survives cancellation");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].order_id, 42);
    assert_eq!(sent[0].to, "customer7@example.com");
    assert_eq!(sent[0].reason, "kitchen closed");
    assert!(sent[0].was_paid);
}

#[tokio::test]
async fn cancel_without_reason_is_rejected_without_writing() {
    let orders = InMemoryOrders::with_orders([order(5, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    let err = harness
        .statuses
        .transition(command(5, "cancelled", Some("   ")))
        .await
        .expect_err("reason required");
    assert!(matches!(err, OrderStatusError::Validation(_)));
    assert_eq!(orders.writes(), 0);
}

#[tokio::test]
async fn requesting_the_current_status_changes_nothing() {
    let orders = InMemoryOrders::with_orders([order(9, 1, OrderStatus::Shipping, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    let same = harness
        .statuses
        .transition(command(9, "Shipping", None))
        .await
        .expect("noop");
    assert_eq!(same.version, 1);
    assert_eq!(orders.writes(), 0);
}

#[tokio::test]
async fn unknown_status_and_missing_orders_are_reported() {
    let orders = InMemoryOrders::with_orders([order(1, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders, Arc::new(RecordingDispatcher::default()));

    let unknown = harness
        .statuses
        .transition(command(1, "teleported", None))
        .await
        .expect_err("unknown");
    assert!(matches!(unknown, OrderStatusError::UnknownStatus(name) if name == "teleported"));

    let missing = harness
        .statuses
        .transition(command(404, "shipping", None))
        .await
        .expect_err("missing");
    assert!(matches!(missing, OrderStatusError::NotFound(404)));

    let invalid_id = harness
        .statuses
        .transition(command(0, "shipping", None))
        .await
        .expect_err("bad id");
    assert!(matches!(invalid_id, OrderStatusError::Validation(_)));
}

#[tokio::test]
async fn concurrent_writer_wins_and_loser_sees_conflict() {
    let orders = InMemoryOrders::with_orders([order(3, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    orders.interfere_next_write();
    let err = harness
        .statuses
        .transition(command(3, "order_confirmed", None))
        .await
        .expect_err("conflict");
    assert!(matches!(err, OrderStatusError::Conflict(3)));
    assert_eq!(
        orders.get(3).map(|o| o.status),
        Some(OrderStatus::OrderPlaced)
    );
}

#[tokio::test]
async fn failed_notice_restores_the_previous_state() {
    let orders = InMemoryOrders::with_orders([order(11, 2, OrderStatus::OrderProcessing, true)]);
    let notifier = Arc::new(FailingDispatcher::default());
    let harness = Harness::new(orders.clone(), notifier.clone());

    let err = harness
        .statuses
        .transition(command(11, "cancelled", Some("out of stock")))
        .await
        .expect_err("notification failed");

    assert!(matches!(err, OrderStatusError::Notification(_)));
    assert!(err.is_downstream());
    assert_eq!(notifier.attempts(), 2);

    let restored = orders.get(11).expect("order present");
    assert_eq!(restored.status, OrderStatus::OrderProcessing);
    assert!(restored.paid);
    assert!(restored.cancel_reason.is_none());
    assert_eq!(restored.version, 3, "cancel and restore both commit");
}

#[tokio::test]
async fn hanging_dispatcher_times_out_per_attempt() {
    let orders = InMemoryOrders::with_orders([order(12, 2, OrderStatus::OrderPlaced, false)]);
    let notifier = Arc::new(FailingDispatcher::hanging());
    let harness = Harness::new(orders.clone(), notifier.clone());

    let started = std::time::Instant::now();
    let err = harness
        .statuses
        .transition(command(12, "cancelled", Some("duplicate order")))
        .await
        .expect_err("timed out");

    assert!(matches!(err, OrderStatusError::Notification(_)));
    assert_eq!(notifier.attempts(), 2);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(
        orders.get(12).map(|o| o.status),
        Some(OrderStatus::OrderPlaced)
    );
}

#[tokio::test]
async fn failed_restore_reports_the_order_as_still_cancelled() {
    let orders = InMemoryOrders::with_orders([order(13, 2, OrderStatus::OrderPlaced, false)]);
    orders.fail_writes_after(1);
    let harness = Harness::new(orders.clone(), Arc::new(FailingDispatcher::default()));

    let err = harness
        .statuses
        .transition(command(13, "cancelled", Some("payment declined")))
        .await
        .expect_err("notification failed");

    assert!(matches!(
        err,
        OrderStatusError::NotificationUncompensated { order_id: 13, .. }
    ));
    assert!(err.to_string().contains("remains cancelled"), "{err}");
    let stuck = orders.get(13).expect("order present");
    assert_eq!(stuck.status, OrderStatus::Cancelled);
    assert_eq!(orders.writes(), 2);
}
