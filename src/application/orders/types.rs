use thiserror::Error;

use crate::application::notify::NotifyError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::domain::types::OrderStatus;

#[derive(Debug, Clone)]
pub struct TransitionCommand {
    pub order_id: i64,
    /// Client-supplied status name, resolved leniently.
    pub status: String,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum OrderStatusError {
    #[error("unknown order status `{0}`")]
    UnknownStatus(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("order {0} not found")]
    NotFound(i64),
    #[error("cannot move order from {from} to {requested}")]
    InvalidTransition {
        from: OrderStatus,
        requested: OrderStatus,
    },
    #[error("order {0} was modified concurrently")]
    Conflict(i64),
    #[error("order store failed")]
    Repo(#[source] RepoError),
    #[error("cancellation notice could not be delivered; cancellation rolled back")]
    Notification(#[source] NotifyError),
    #[error(
        "cancellation notice could not be delivered and the rollback failed ({restore}); order {order_id} remains cancelled"
    )]
    NotificationUncompensated {
        order_id: i64,
        #[source]
        notify: NotifyError,
        restore: RepoError,
    },
}

impl OrderStatusError {
    /// Failures of a collaborator rather than of the request.
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            OrderStatusError::Repo(_)
                | OrderStatusError::Notification(_)
                | OrderStatusError::NotificationUncompensated { .. }
        )
    }
}

impl From<DomainError> for OrderStatusError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => OrderStatusError::Validation(message),
            DomainError::InvalidTransition { from, requested } => {
                OrderStatusError::InvalidTransition { from, requested }
            }
        }
    }
}

impl From<RepoError> for OrderStatusError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict { id, .. } => OrderStatusError::Conflict(id),
            other => OrderStatusError::Repo(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderQueryError {
    #[error("order {0} not found")]
    NotFound(i64),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A read result and whether it was served from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served<T> {
    pub value: T,
    pub cached: bool,
}

impl<T> Served<T> {
    pub fn from_pair((value, cached): (T, bool)) -> Self {
        Self { value, cached }
    }
}
