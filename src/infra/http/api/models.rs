use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::application::repos::{OrderPage, OrderQueryFilter, OrderSort};
use crate::domain::entities::{OrderRecord, OrderStatusCount, OrderStatusRecord};
use crate::domain::types::OrderStatus;

use super::error::ApiError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Deserialize, Serialize)]
pub struct OrderStatusRequest {
    pub status: String,
    #[serde(default)]
    pub cancel_reason: Option<String>,
}

/// Query string of the admin order listing. Values stay raw so that parse
/// failures surface as `validation_failed` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub customer_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl OrderListParams {
    pub fn into_filter(self) -> Result<OrderQueryFilter, ApiError> {
        let defaults = OrderQueryFilter::default();
        let sort = match present(&self.sort) {
            Some(raw) => OrderSort::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown sort `{raw}`")))?,
            None => defaults.sort,
        };
        Ok(OrderQueryFilter {
            customer_id: parse_id("customer_id", &self.customer_id)?,
            status: parse_status(&self.status)?,
            search: present(&self.search).map(str::to_string),
            placed_from: parse_date("from", &self.from)?,
            placed_to: parse_date("to", &self.to)?,
            sort,
            page: parse_count("page", &self.page)?.unwrap_or(defaults.page),
            per_page: parse_count("per_page", &self.per_page)?.unwrap_or(defaults.per_page),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerOrdersParams {
    pub status: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

/// Parsed form of [`CustomerOrdersParams`].
#[derive(Debug, Clone, Copy)]
pub struct CustomerOrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub per_page: u32,
}

impl CustomerOrdersParams {
    pub fn parse(self) -> Result<CustomerOrdersQuery, ApiError> {
        let defaults = OrderQueryFilter::default();
        Ok(CustomerOrdersQuery {
            status: parse_status(&self.status)?,
            page: parse_count("page", &self.page)?.unwrap_or(defaults.page),
            per_page: parse_count("per_page", &self.per_page)?.unwrap_or(defaults.per_page),
        })
    }
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

pub fn parse_id(name: &str, raw: &Option<String>) -> Result<Option<i64>, ApiError> {
    present(raw)
        .map(|value| match value.parse::<i64>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(ApiError::validation(format!(
                "{name} must be a positive integer"
            ))),
        })
        .transpose()
}

fn parse_count(name: &str, raw: &Option<String>) -> Result<Option<u32>, ApiError> {
    present(raw)
        .map(|value| match value.parse::<u32>() {
            Ok(count) if count > 0 => Ok(count),
            _ => Err(ApiError::validation(format!(
                "{name} must be a positive integer"
            ))),
        })
        .transpose()
}

fn parse_status(raw: &Option<String>) -> Result<Option<OrderStatus>, ApiError> {
    present(raw)
        .map(|value| {
            OrderStatus::resolve(value)
                .ok_or_else(|| ApiError::validation(format!("unknown status filter `{value}`")))
        })
        .transpose()
}

fn parse_date(name: &str, raw: &Option<String>) -> Result<Option<Date>, ApiError> {
    present(raw)
        .map(|value| {
            Date::parse(value, DATE_FORMAT)
                .map_err(|_| ApiError::validation(format!("{name} must be a YYYY-MM-DD date")))
        })
        .transpose()
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub customer_id: i64,
    pub customer_email: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub paid: bool,
    pub cancel_reason: Option<String>,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<OrderRecord> for OrderView {
    fn from(order: OrderRecord) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            customer_email: order.customer_email,
            status: order.status,
            status_label: order.status.label(),
            paid: order.paid,
            cancel_reason: order.cancel_reason,
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderPageView {
    pub items: Vec<OrderView>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl From<OrderPage> for OrderPageView {
    fn from(page: OrderPage) -> Self {
        Self {
            items: page.items.into_iter().map(OrderView::from).collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusCountView {
    pub status: OrderStatus,
    pub label: &'static str,
    pub count: u64,
}

impl From<OrderStatusCount> for StatusCountView {
    fn from(entry: OrderStatusCount) -> Self {
        Self {
            status: entry.status,
            label: entry.status.label(),
            count: entry.count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub status: OrderStatus,
    pub label: String,
    pub position: i32,
    pub next: Vec<OrderStatus>,
}

impl From<OrderStatusRecord> for StatusView {
    fn from(record: OrderStatusRecord) -> Self {
        Self {
            next: crate::domain::orders::allowed_next(record.status).to_vec(),
            status: record.status,
            label: record.label,
            position: record.position,
        }
    }
}
