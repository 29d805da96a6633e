//! Order status changes and cached order reads.

mod queries;
mod service;
mod types;

pub use queries::OrderQueryService;
pub use service::OrderStatusService;
pub use types::{OrderQueryError, OrderStatusError, Served, TransitionCommand};
