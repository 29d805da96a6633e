//! Customer notification port.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected by provider: {0}")]
    Rejected(String),
}

/// A cancellation to tell the customer about.
#[derive(Debug, Clone, Copy)]
pub struct CancellationMessage<'a> {
    pub order_id: i64,
    pub to_address: &'a str,
    pub reason: &'a str,
    pub was_paid: bool,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_cancellation(&self, message: CancellationMessage<'_>) -> Result<(), NotifyError>;
}

/// How hard the status service tries before giving up on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    pub max_attempts: NonZeroU32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            backoff: Duration::from_millis(200),
        }
    }
}
