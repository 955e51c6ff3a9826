use redis::aio::ConnectionManager;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::{Gateway, Provider};
use crate::models::provider::ProviderKind;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: ConnectionManager,
    pub config: Config,
    pub gateway: Gateway,
}

impl AppState {
    /// Look up a configured provider or fail with 503.
    pub fn provider(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>, AppError> {
        self.gateway
            .get(kind)
            .ok_or(AppError::ProviderUnavailable(kind))
    }
}
