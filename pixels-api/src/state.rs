//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use pixels_cache::CanvasCacheManager;
use pixels_storage::{FastStore, HistoryStore};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;

/// Cache manager over whichever stores the process was started with.
pub type CanvasManager = CanvasCacheManager<dyn HistoryStore, dyn FastStore>;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CanvasManager>,
    /// Direct handle for health probes.
    pub history: Arc<dyn HistoryStore>,
    /// Direct handle for health probes and rate-limit buckets.
    pub fast: Arc<dyn FastStore>,
    pub auth: Arc<AuthConfig>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        fast: Arc<dyn FastStore>,
        auth: AuthConfig,
        config: ApiConfig,
    ) -> Self {
        let cache = CanvasCacheManager::new(history.clone(), fast.clone(), config.cache_config());
        Self {
            cache: Arc::new(cache),
            history,
            fast,
            auth: Arc::new(auth),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<CanvasManager>, cache);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Instant, start_time);
