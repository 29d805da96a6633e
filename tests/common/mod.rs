//! Shared fixtures: an in-memory order store and scripted notification dispatchers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dishdash::application::notify::{
    CancellationMessage, DeliveryPolicy, NotificationDispatcher, NotifyError,
};
use dishdash::application::orders::{OrderQueryService, OrderStatusService};
use dishdash::application::repos::{
    OrderPage, OrderQueryFilter, OrderSort, OrdersRepo, OrdersWriteRepo, RepoError,
    UpdateOrderStatusParams,
};
use dishdash::cache::{CacheConfig, CacheLayer, CacheStore, MemoryStore};
use dishdash::domain::entities::{OrderRecord, OrderStatusCount, OrderStatusRecord};
use dishdash::domain::types::OrderStatus;
use dishdash::infra::http::{self, ApiState};
use time::OffsetDateTime;
use time::macros::datetime;

pub fn order(id: i64, customer_id: i64, status: OrderStatus, paid: bool) -> OrderRecord {
    let placed = datetime!(2024-03-10 12:00 UTC) + time::Duration::minutes(id);
    OrderRecord {
        id,
        customer_id,
        customer_email: format!("customer{customer_id}@example.com"),
        status,
        paid,
        cancel_reason: None,
        version: 1,
        created_at: placed,
        updated_at: placed,
    }
}

/// Orders kept in a map, with hooks to simulate concurrent writers and outages.
#[derive(Default)]
pub struct InMemoryOrders {
    rows: Mutex<BTreeMap<i64, OrderRecord>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    interfere_next_write: AtomicBool,
    fail_writes_after: Mutex<Option<usize>>,
}

impl InMemoryOrders {
    pub fn with_orders(orders: impl IntoIterator<Item = OrderRecord>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().expect("rows lock");
            for order in orders {
                rows.insert(order.id, order);
            }
        }
        Arc::new(store)
    }

    pub fn get(&self, id: i64) -> Option<OrderRecord> {
        self.rows.lock().expect("rows lock").get(&id).cloned()
    }

    /// Calls that reached the store through the read trait.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Another writer commits just before the next versioned write lands.
    pub fn interfere_next_write(&self) {
        self.interfere_next_write.store(true, Ordering::SeqCst);
    }

    /// Writes beyond the first `count` fail with a timeout.
    pub fn fail_writes_after(&self, count: usize) {
        *self.fail_writes_after.lock().expect("budget lock") = Some(count);
    }
}

#[async_trait]
impl OrdersRepo for InMemoryOrders {
    async fn find_by_id(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(id))
    }

    async fn list_orders(&self, filter: &OrderQueryFilter) -> Result<OrderPage, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().expect("rows lock");
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut matched: Vec<OrderRecord> = rows
            .values()
            .filter(|o| filter.customer_id.is_none_or(|id| o.customer_id == id))
            .filter(|o| filter.status.is_none_or(|status| o.status == status))
            .filter(|o| {
                search
                    .as_deref()
                    .is_none_or(|needle| o.customer_email.to_lowercase().contains(needle))
            })
            .filter(|o| filter.placed_from.is_none_or(|from| o.created_at.date() >= from))
            .filter(|o| filter.placed_to.is_none_or(|to| o.created_at.date() <= to))
            .cloned()
            .collect();
        matched.sort_by_key(|o| (o.created_at, o.id));
        if filter.sort == OrderSort::NewestFirst {
            matched.reverse();
        }
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .collect();
        Ok(OrderPage {
            items,
            page: filter.page,
            per_page: filter.per_page,
            total,
        })
    }

    async fn count_by_status(&self) -> Result<Vec<OrderStatusCount>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().expect("rows lock");
        Ok(OrderStatus::ALL
            .into_iter()
            .map(|status| OrderStatusCount {
                status,
                count: rows.values().filter(|o| o.status == status).count() as u64,
            })
            .collect())
    }

    async fn list_statuses(&self) -> Result<Vec<OrderStatusRecord>, RepoError> {
        Ok(OrderStatus::ALL
            .into_iter()
            .enumerate()
            .map(|(index, status)| OrderStatusRecord {
                status,
                label: status.label().to_string(),
                position: index as i32 + 1,
            })
            .collect())
    }
}

#[async_trait]
impl OrdersWriteRepo for InMemoryOrders {
    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, RepoError> {
        let attempted = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(budget) = *self.fail_writes_after.lock().expect("budget lock")
            && attempted >= budget
        {
            return Err(RepoError::Timeout);
        }

        let mut rows = self.rows.lock().expect("rows lock");
        let row = rows.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if self.interfere_next_write.swap(false, Ordering::SeqCst) {
            row.version += 1;
        }
        if row.version != params.expected_version {
            return Err(RepoError::Conflict {
                id: params.id,
                expected_version: params.expected_version,
            });
        }
        row.status = params.status;
        row.paid = params.paid;
        row.cancel_reason = params.cancel_reason;
        row.version += 1;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub order_id: i64,
    pub to: String,
    pub reason: String,
    pub was_paid: bool,
}

/// Records every notice and succeeds.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentNotice>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_cancellation(&self, message: CancellationMessage<'_>) -> Result<(), NotifyError> {
        self.sent.lock().expect("sent lock").push(SentNotice {
            order_id: message.order_id,
            to: message.to_address.to_string(),
            reason: message.reason.to_string(),
            was_paid: message.was_paid,
        });
        Ok(())
    }
}

/// Fails every attempt, optionally by hanging past the delivery timeout.
#[derive(Default)]
pub struct FailingDispatcher {
    attempts: AtomicUsize,
    hang: bool,
}

impl FailingDispatcher {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn send_cancellation(&self, _message: CancellationMessage<'_>) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Err(NotifyError::Transport("relay refused connection".to_string()))
    }
}

pub fn fast_delivery(max_attempts: u32) -> DeliveryPolicy {
    DeliveryPolicy {
        timeout: Duration::from_millis(50),
        max_attempts: std::num::NonZeroU32::new(max_attempts).expect("non-zero attempts"),
        backoff: Duration::from_millis(1),
    }
}

/// Services wired over in-memory collaborators and a memory cache.
pub struct Harness {
    pub orders: Arc<InMemoryOrders>,
    pub store: Arc<MemoryStore>,
    pub cache: CacheLayer,
    pub statuses: Arc<OrderStatusService>,
    pub queries: Arc<OrderQueryService>,
}

impl Harness {
    pub fn new(orders: Arc<InMemoryOrders>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self::with_delivery(orders, notifier, fast_delivery(2))
    }

    pub fn with_delivery(
        orders: Arc<InMemoryOrders>,
        notifier: Arc<dyn NotificationDispatcher>,
        delivery: DeliveryPolicy,
    ) -> Self {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryStore::new(&config));
        let shared: Arc<dyn CacheStore> = store.clone();
        let cache = CacheLayer::new(shared, config);
        let statuses = Arc::new(OrderStatusService::new(
            orders.clone(),
            orders.clone(),
            notifier,
            cache.registry.clone(),
            delivery,
        ));
        let queries = Arc::new(OrderQueryService::new(orders.clone(), cache.reads.clone()));
        Self {
            orders,
            store,
            cache,
            statuses,
            queries,
        }
    }

    pub fn router(&self) -> axum::Router {
        http::build_router(ApiState {
            statuses: self.statuses.clone(),
            queries: self.queries.clone(),
            db: None,
        })
    }
}
