use std::sync::Arc;

use tracing::instrument;

use crate::application::orders::types::{OrderQueryError, Served};
use crate::application::repos::{OrderPage, OrderQueryFilter, OrdersRepo};
use crate::cache::{GroupKey, ReadThroughCache, ViewKind, ViewQuery};
use crate::domain::entities::{OrderRecord, OrderStatusCount, OrderStatusRecord};
use crate::domain::types::OrderStatus;

const MAX_PER_PAGE: u32 = 100;

/// Cached order reads.
#[derive(Clone)]
pub struct OrderQueryService {
    reader: Arc<dyn OrdersRepo>,
    cache: Arc<ReadThroughCache>,
}

impl OrderQueryService {
    pub fn new(reader: Arc<dyn OrdersRepo>, cache: Arc<ReadThroughCache>) -> Self {
        Self { reader, cache }
    }

    #[instrument(skip(self))]
    pub async fn order_detail(&self, id: i64) -> Result<Served<OrderRecord>, OrderQueryError> {
        if id <= 0 {
            return Err(OrderQueryError::Validation(
                "order id must be a positive integer".to_string(),
            ));
        }
        let query = ViewQuery::new(ViewKind::Order).entity(id);
        let reader = self.reader.clone();
        self.cache
            .get_or_compute(
                &query,
                self.cache.ttl_for(ViewKind::Order),
                &[GroupKey::Order(id)],
                || async move {
                    let found = reader.find_by_id(id).await.map_err(OrderQueryError::from)?;
                    found.ok_or(OrderQueryError::NotFound(id))
                },
            )
            .await
            .map(Served::from_pair)
    }

    /// One customer's orders, optionally narrowed to a status.
    #[instrument(skip(self))]
    pub async fn customer_orders(
        &self,
        customer_id: i64,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Served<OrderPage>, OrderQueryError> {
        if customer_id <= 0 {
            return Err(OrderQueryError::Validation(
                "customer id must be a positive integer".to_string(),
            ));
        }
        let (page, per_page) = normalize_page(page, per_page);
        let filter = OrderQueryFilter {
            customer_id: Some(customer_id),
            status,
            page,
            per_page,
            ..Default::default()
        };
        let query = ViewQuery::new(ViewKind::CustomerOrders)
            .entity(customer_id)
            .page(filter.page, filter.per_page)
            .filter("status", status.map(OrderStatus::as_str));
        let groups = [GroupKey::CustomerOrders(customer_id), GroupKey::OrderIndex];
        self.list_with(query, ViewKind::CustomerOrders, &groups, filter)
            .await
    }

    /// Admin listing across all customers.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderQueryFilter,
    ) -> Result<Served<OrderPage>, OrderQueryError> {
        if let (Some(from), Some(to)) = (filter.placed_from, filter.placed_to)
            && from > to
        {
            return Err(OrderQueryError::Validation(
                "`from` must not be after `to`".to_string(),
            ));
        }
        let (page, per_page) = normalize_page(filter.page, filter.per_page);
        let filter = OrderQueryFilter {
            search: filter
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            page,
            per_page,
            ..filter
        };

        let mut groups = vec![GroupKey::OrderIndex];
        if let Some(customer_id) = filter.customer_id {
            groups.push(GroupKey::CustomerOrders(customer_id));
        }
        let query = ViewQuery::new(ViewKind::Orders)
            .page(filter.page, filter.per_page)
            .sort(filter.sort.as_str())
            .search(filter.search.as_deref())
            .date_range(filter.placed_from, filter.placed_to)
            .filter("customer_id", filter.customer_id)
            .filter("status", filter.status.map(OrderStatus::as_str));
        self.list_with(query, ViewKind::Orders, &groups, filter)
            .await
    }

    /// Order counts per status; not group-tracked, cleared by pattern.
    #[instrument(skip(self))]
    pub async fn status_counts(&self) -> Result<Served<Vec<OrderStatusCount>>, OrderQueryError> {
        let query = ViewQuery::new(ViewKind::OrderStats);
        let reader = self.reader.clone();
        self.cache
            .get_or_compute(
                &query,
                self.cache.ttl_for(ViewKind::OrderStats),
                &[],
                || async move {
                    reader
                        .count_by_status()
                        .await
                        .map_err(OrderQueryError::from)
                },
            )
            .await
            .map(Served::from_pair)
    }

    /// The status reference table; small and static, so never cached.
    pub async fn status_catalog(&self) -> Result<Vec<OrderStatusRecord>, OrderQueryError> {
        Ok(self.reader.list_statuses().await?)
    }

    async fn list_with(
        &self,
        query: ViewQuery,
        view: ViewKind,
        groups: &[GroupKey],
        filter: OrderQueryFilter,
    ) -> Result<Served<OrderPage>, OrderQueryError> {
        let reader = self.reader.clone();
        self.cache
            .get_or_compute(&query, self.cache.ttl_for(view), groups, || async move {
                reader
                    .list_orders(&filter)
                    .await
                    .map_err(OrderQueryError::from)
            })
            .await
            .map(Served::from_pair)
    }
}

fn normalize_page(page: u32, per_page: u32) -> (u32, u32) {
    (page.max(1), per_page.clamp(1, MAX_PER_PAGE))
}
