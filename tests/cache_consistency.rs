//! Reads served after a committed status change never show the old state.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingDispatcher, Harness, InMemoryOrders, RecordingDispatcher, order};
use dishdash::application::orders::TransitionCommand;
use dishdash::application::repos::OrderQueryFilter;
use dishdash::cache::{CacheStore, ViewKind, ViewQuery};
use dishdash::domain::types::OrderStatus;

fn advance_to(order_id: i64, status: OrderStatus) -> TransitionCommand {
    TransitionCommand {
        order_id,
        status: status.as_str().to_string(),
        cancel_reason: None,
    }
}

#[tokio::test]
async fn detail_read_after_transition_is_fresh() {
    let orders = InMemoryOrders::with_orders([order(42, 7, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    let first = harness.queries.order_detail(42).await.expect("detail");
    assert!(!first.cached);
    let second = harness.queries.order_detail(42).await.expect("detail");
    assert!(second.cached);
    assert_eq!(orders.reads(), 1);

    harness
        .statuses
        .transition(advance_to(42, OrderStatus::OrderConfirmed))
        .await
        .expect("advance");

    let after = harness.queries.order_detail(42).await.expect("detail");
    assert!(!after.cached, "transition must drop the cached detail");
    assert_eq!(after.value.status, OrderStatus::OrderConfirmed);
    assert_eq!(after.value.version, 2);
}

#[tokio::test]
async fn list_views_of_the_customer_and_index_are_dropped() {
    let orders = InMemoryOrders::with_orders([
        order(1, 7, OrderStatus::OrderPlaced, false),
        order(2, 7, OrderStatus::Shipping, false),
        order(3, 8, OrderStatus::OrderPlaced, false),
    ]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    let mine = harness
        .queries
        .customer_orders(7, None, 1, 20)
        .await
        .expect("customer list");
    assert_eq!(mine.value.total, 2);
    let other = harness
        .queries
        .customer_orders(8, None, 1, 20)
        .await
        .expect("other customer");
    let admin = harness
        .queries
        .list_orders(OrderQueryFilter {
            status: Some(OrderStatus::Shipping),
            ..Default::default()
        })
        .await
        .expect("admin list");
    assert_eq!(admin.value.total, 1);
    assert!(!mine.cached && !other.cached && !admin.cached);

    harness
        .statuses
        .transition(advance_to(2, OrderStatus::Delivered))
        .await
        .expect("deliver");

    let mine = harness
        .queries
        .customer_orders(7, None, 1, 20)
        .await
        .expect("customer list");
    assert!(!mine.cached);
    let delivered = mine
        .value
        .items
        .iter()
        .find(|o| o.id == 2)
        .expect("order 2 listed");
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.paid);

    let admin = harness
        .queries
        .list_orders(OrderQueryFilter {
            status: Some(OrderStatus::Shipping),
            ..Default::default()
        })
        .await
        .expect("admin list");
    assert!(!admin.cached, "admin index is invalidated on every write");
    assert_eq!(admin.value.total, 0);

    let other = harness
        .queries
        .customer_orders(8, None, 1, 20)
        .await
        .expect("other customer");
    assert!(!other.cached, "customer lists are also members of the index group");
}

#[tokio::test]
async fn status_counts_are_cleared_by_pattern() {
    let orders = InMemoryOrders::with_orders([
        order(1, 7, OrderStatus::OrderPlaced, false),
        order(2, 7, OrderStatus::OrderPlaced, false),
    ]);
    let harness = Harness::new(orders, Arc::new(RecordingDispatcher::default()));

    let before = harness.queries.status_counts().await.expect("stats");
    assert!(!before.cached);
    assert!(harness.queries.status_counts().await.expect("stats").cached);

    harness
        .statuses
        .transition(advance_to(1, OrderStatus::OrderConfirmed))
        .await
        .expect("advance");

    let after = harness.queries.status_counts().await.expect("stats");
    assert!(!after.cached);
    let placed = after
        .value
        .iter()
        .find(|c| c.status == OrderStatus::OrderPlaced)
        .map(|c| c.count);
    let confirmed = after
        .value
        .iter()
        .find(|c| c.status == OrderStatus::OrderConfirmed)
        .map(|c| c.count);
    assert_eq!(placed, Some(1));
    assert_eq!(confirmed, Some(1));
}

#[tokio::test]
async fn rejected_transition_keeps_cached_views() {
    let orders = InMemoryOrders::with_orders([order(5, 1, OrderStatus::Delivered, true)]);
    let harness = Harness::new(orders, Arc::new(RecordingDispatcher::default()));

    harness.queries.order_detail(5).await.expect("warm");
    harness
        .statuses
        .transition(advance_to(5, OrderStatus::Shipping))
        .await
        .expect_err("terminal");

    assert!(harness.queries.order_detail(5).await.expect("detail").cached);
}

#[tokio::test]
async fn compensated_cancellation_is_not_served_from_cache() {
    let orders = InMemoryOrders::with_orders([order(6, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders, Arc::new(FailingDispatcher::default()));

    harness.queries.order_detail(6).await.expect("warm");
    harness
        .statuses
        .transition(TransitionCommand {
            order_id: 6,
            status: "cancelled".to_string(),
            cancel_reason: Some("courier unavailable".to_string()),
        })
        .await
        .expect_err("notice failed");

    let detail = harness.queries.order_detail(6).await.expect("detail");
    assert!(!detail.cached);
    assert_eq!(detail.value.status, OrderStatus::OrderPlaced);
    assert_eq!(detail.value.version, 3);
}

#[tokio::test]
async fn corrupt_entries_are_discarded_and_recomputed() {
    let orders = InMemoryOrders::with_orders([order(8, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    let key = harness
        .cache
        .reads
        .key_for(&ViewQuery::new(ViewKind::Order).entity(8));
    harness
        .store
        .set(key.as_str(), b"{not json", Duration::from_secs(60))
        .await
        .expect("seed corrupt entry");

    let detail = harness.queries.order_detail(8).await.expect("detail");
    assert!(!detail.cached);
    assert_eq!(detail.value.id, 8);
    assert_eq!(orders.reads(), 1);

    assert!(harness.queries.order_detail(8).await.expect("detail").cached);
}

#[tokio::test]
async fn failed_reads_are_not_cached() {
    let orders = InMemoryOrders::with_orders([order(1, 1, OrderStatus::OrderPlaced, false)]);
    let harness = Harness::new(orders.clone(), Arc::new(RecordingDispatcher::default()));

    assert!(harness.queries.order_detail(77).await.is_err());
    assert!(harness.queries.order_detail(77).await.is_err());
    assert_eq!(orders.reads(), 2);
}
