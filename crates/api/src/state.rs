//! Application state

use std::sync::Arc;

use billhook_billing::{BillingService, BillingStore, PaddleConfig};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Present when backed by Postgres; used for the health probe
    pub pool: Option<PgPool>,
    pub billing: BillingService,
}

impl AppState {
    /// State backed by Postgres
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            billing: BillingService::from_pool(&config.paddle, pool.clone()),
            pool: Some(pool),
        }
    }

    /// State over an arbitrary store, without a database handle
    pub fn with_store(paddle: &PaddleConfig, store: Arc<dyn BillingStore>) -> Self {
        Self {
            pool: None,
            billing: BillingService::new(paddle, store),
        }
    }
}
