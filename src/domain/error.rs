use thiserror::Error;

use crate::domain::types::OrderStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("cannot move order from {from} to {requested}")]
    InvalidTransition {
        from: OrderStatus,
        requested: OrderStatus,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: OrderStatus, requested: OrderStatus) -> Self {
        Self::InvalidTransition { from, requested }
    }
}
