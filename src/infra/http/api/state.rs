use std::sync::Arc;

use crate::application::orders::{OrderQueryService, OrderStatusService};
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub statuses: Arc<OrderStatusService>,
    pub queries: Arc<OrderQueryService>,
    /// Absent when the services run over non-Postgres repositories.
    pub db: Option<Arc<PostgresRepositories>>,
}
