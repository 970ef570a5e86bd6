use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use wall_db::Database;
use wall_gateway::FanoutBroker;
use wall_gateway::session::DEFAULT_HEARTBEAT_INTERVAL;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub broker: FanoutBroker,
    pub jwt_secret: String,
    pub settings: WallSettings,
}

#[derive(Debug, Clone)]
pub struct WallSettings {
    /// Base URL used to build shareable event links.
    pub public_url: String,
    pub heartbeat: Duration,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
}

impl Default for WallSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".into(),
            heartbeat: DEFAULT_HEARTBEAT_INTERVAL,
            default_page_limit: 10,
            max_page_limit: 100,
        }
    }
}

impl WallSettings {
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_limit)
            .clamp(1, self.max_page_limit.max(1))
    }
}

/// Run blocking SQLite work off the async runtime. Store failures surface as
/// a retryable [`ApiError::StoreUnavailable`].
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::StoreUnavailable)
}
