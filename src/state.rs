use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::websocket::typing::TypingTracker;
use crate::websocket::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: ConnectionRegistry,
    pub typing: TypingTracker,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<Config>) -> Self {
        let typing = TypingTracker::new(Duration::from_millis(config.typing_ttl_ms));
        Self {
            db,
            registry: ConnectionRegistry::new(),
            typing,
            config,
        }
    }
}
