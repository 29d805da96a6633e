use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::application::error::ErrorReport;
use crate::application::orders::TransitionCommand;

use super::error::{ApiError, query_error_to_api, status_error_to_api};
use super::models::{
    CustomerOrdersParams, OrderListParams, OrderPageView, OrderStatusRequest, OrderView,
    StatusCountView, StatusView, parse_id,
};
use super::state::ApiState;

const CACHE_HEADER: HeaderName = HeaderName::from_static("x-cache");

fn cache_header(cached: bool) -> [(HeaderName, HeaderValue); 1] {
    let value = if cached { "hit" } else { "miss" };
    [(CACHE_HEADER, HeaderValue::from_static(value))]
}

fn path_id(name: &str, raw: String) -> Result<i64, ApiError> {
    parse_id(name, &Some(raw))?.ok_or_else(|| ApiError::validation(format!("{name} is required")))
}

pub async fn update_order_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<OrderStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = path_id("order id", id)?;
    let Json(payload) = payload.map_err(|err| ApiError::validation(err.body_text()))?;

    let order = state
        .statuses
        .transition(TransitionCommand {
            order_id,
            status: payload.status,
            cancel_reason: payload.cancel_reason,
        })
        .await
        .map_err(status_error_to_api)?;

    Ok(Json(OrderView::from(order)))
}

pub async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = path_id("order id", id)?;
    let served = state
        .queries
        .order_detail(order_id)
        .await
        .map_err(query_error_to_api)?;

    Ok((cache_header(served.cached), Json(OrderView::from(served.value))))
}

pub async fn list_orders(
    State(state): State<ApiState>,
    params: Result<Query<OrderListParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|err| ApiError::validation(err.body_text()))?;
    let filter = params.into_filter()?;
    let served = state
        .queries
        .list_orders(filter)
        .await
        .map_err(query_error_to_api)?;

    Ok((
        cache_header(served.cached),
        Json(OrderPageView::from(served.value)),
    ))
}

pub async fn customer_orders(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
    params: Result<Query<CustomerOrdersParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let customer_id = path_id("customer id", customer_id)?;
    let Query(params) = params.map_err(|err| ApiError::validation(err.body_text()))?;
    let query = params.parse()?;
    let served = state
        .queries
        .customer_orders(customer_id, query.status, query.page, query.per_page)
        .await
        .map_err(query_error_to_api)?;

    Ok((
        cache_header(served.cached),
        Json(OrderPageView::from(served.value)),
    ))
}

pub async fn order_stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let served = state
        .queries
        .status_counts()
        .await
        .map_err(query_error_to_api)?;
    let counts: Vec<StatusCountView> = served
        .value
        .into_iter()
        .map(StatusCountView::from)
        .collect();

    Ok((cache_header(served.cached), Json(counts)))
}

pub async fn list_statuses(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let statuses = state
        .queries
        .status_catalog()
        .await
        .map_err(query_error_to_api)?;
    let statuses: Vec<StatusView> = statuses.into_iter().map(StatusView::from).collect();
    Ok(Json(statuses))
}

pub async fn db_health(State(state): State<ApiState>) -> Response {
    match state.db {
        Some(db) => crate::infra::http::db_health_response(db.health_check().await),
        None => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                "no database configured",
            )
            .attach(&mut response);
            response
        }
    }
}
