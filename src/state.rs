use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::notification_service::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            notifier,
        }
    }
}
