use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{
    OrderPage, OrderQueryFilter, OrderSort, OrdersRepo, OrdersWriteRepo, RepoError,
    UpdateOrderStatusParams,
};
use crate::domain::entities::{OrderRecord, OrderStatusCount, OrderStatusRecord};
use crate::domain::types::OrderStatus;

use super::util::escape_like;
use super::{PostgresRepositories, map_sqlx_error};

const ORDER_COLUMNS: &str = "id, customer_id, customer_email, status, paid, cancel_reason, \
    version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_id: i64,
    customer_email: String,
    status: OrderStatus,
    paid: bool,
    cancel_reason: Option<String>,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            customer_email: row.customer_email,
            status: row.status,
            paid: row.paid,
            cancel_reason: row.cancel_reason,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    status: OrderStatus,
    label: String,
    position: i32,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: OrderStatus,
    count: i64,
}

impl PostgresRepositories {
    fn apply_order_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q OrderQueryFilter) {
        if let Some(customer_id) = filter.customer_id {
            qb.push(" AND customer_id = ");
            qb.push_bind(customer_id);
        }

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }

        if let Some(search) = filter.search.as_ref() {
            qb.push(" AND customer_email ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(search)));
            qb.push(r" ESCAPE '\'");
        }

        if let Some(from) = filter.placed_from {
            qb.push(" AND (created_at AT TIME ZONE 'UTC')::date >= ");
            qb.push_bind(from);
        }

        if let Some(to) = filter.placed_to {
            qb.push(" AND (created_at AT TIME ZONE 'UTC')::date <= ");
            qb.push_bind(to);
        }
    }
}

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<OrderRecord>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OrderRecord::from))
    }

    async fn list_orders(&self, filter: &OrderQueryFilter) -> Result<OrderPage, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1 ");
        Self::apply_order_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1 "));
        Self::apply_order_filter(&mut qb, filter);
        qb.push(match filter.sort {
            OrderSort::NewestFirst => " ORDER BY created_at DESC, id DESC",
            OrderSort::OldestFirst => " ORDER BY created_at ASC, id ASC",
        });
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(filter.per_page));
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset());

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(OrderPage {
            items: rows.into_iter().map(OrderRecord::from).collect(),
            page: filter.page,
            per_page: filter.per_page,
            total: Self::convert_count(total)?,
        })
    }

    async fn count_by_status(&self) -> Result<Vec<OrderStatusCount>, RepoError> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT s.status, COUNT(o.id) AS count
            FROM order_statuses s
            LEFT JOIN orders o ON o.status = s.status
            GROUP BY s.status, s.position
            ORDER BY s.position
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderStatusCount {
                    status: row.status,
                    count: Self::convert_count(row.count)?,
                })
            })
            .collect()
    }

    async fn list_statuses(&self) -> Result<Vec<OrderStatusRecord>, RepoError> {
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT status, label, position FROM order_statuses ORDER BY position",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| OrderStatusRecord {
                status: row.status,
                label: row.label,
                position: row.position,
            })
            .collect())
    }
}

#[async_trait]
impl OrdersWriteRepo for PostgresRepositories {
    async fn update_order_status(
        &self,
        params: UpdateOrderStatusParams,
    ) -> Result<OrderRecord, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders
            SET status = $3,
                paid = $4,
                cancel_reason = $5,
                version = version + 1,
                updated_at = now()
            WHERE id = $1 AND version = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(params.id)
        .bind(params.expected_version)
        .bind(params.status)
        .bind(params.paid)
        .bind(params.cancel_reason.as_deref())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return Ok(OrderRecord::from(row));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(params.id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if exists {
            Err(RepoError::Conflict {
                id: params.id,
                expected_version: params.expected_version,
            })
        } else {
            Err(RepoError::NotFound)
        }
    }
}
