use crate::application::error::ErrorReport;
use crate::application::orders::{OrderQueryError, OrderStatusError};
use crate::application::repos::RepoError;
use crate::domain::types::OrderStatus;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const UNKNOWN_STATUS: &str = "unknown_status";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    pub const CONFLICT: &str = "conflict";
    pub const DOWNSTREAM: &str = "downstream_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    /// Logged through the error report, never sent to the client.
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn validation(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_FAILED,
            "Validation failed",
            Some(hint.into()),
        )
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let logged = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.to_string());
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, logged),
        )
        .attach(&mut response);
        response
    }
}

fn known_statuses() -> String {
    OrderStatus::ALL
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn repo_unavailable(err: &RepoError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::DOWNSTREAM,
        "Order store unavailable",
        Some("retry the request later".to_string()),
    )
    .with_detail(err.to_string())
}

pub fn status_error_to_api(err: OrderStatusError) -> ApiError {
    match err {
        OrderStatusError::UnknownStatus(name) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::UNKNOWN_STATUS,
            "Unknown order status",
            Some(format!("`{name}` is not one of: {}", known_statuses())),
        ),
        OrderStatusError::Validation(message) => ApiError::validation(message),
        OrderStatusError::NotFound(_) => ApiError::not_found("Order not found"),
        OrderStatusError::InvalidTransition { from, requested } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INVALID_TRANSITION,
            "Status change not allowed",
            Some(format!("an order cannot move from {from} to {requested}")),
        ),
        OrderStatusError::Conflict(_) => ApiError::new(
            StatusCode::CONFLICT,
            codes::CONFLICT,
            "Order was modified concurrently",
            Some("reload the order and retry".to_string()),
        ),
        OrderStatusError::Repo(err) => repo_unavailable(&err),
        OrderStatusError::Notification(err) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::DOWNSTREAM,
            "Cancellation notice could not be delivered",
            Some(
                "the cancellation was rolled back; the order keeps its previous status"
                    .to_string(),
            ),
        )
        .with_detail(err.to_string()),
        OrderStatusError::NotificationUncompensated {
            order_id,
            notify,
            restore,
        } => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::DOWNSTREAM,
            "Order cancelled but the customer was not notified",
            Some(format!(
                "order {order_id} remains cancelled; notify the customer manually"
            )),
        )
        .with_detail(format!("{notify}; rollback failed: {restore}")),
    }
}

pub fn query_error_to_api(err: OrderQueryError) -> ApiError {
    match err {
        OrderQueryError::NotFound(_) => ApiError::not_found("Order not found"),
        OrderQueryError::Validation(message) => ApiError::validation(message),
        OrderQueryError::Repo(RepoError::InvalidInput { message }) => {
            ApiError::validation(message)
        }
        OrderQueryError::Repo(err) => repo_unavailable(&err),
    }
}
