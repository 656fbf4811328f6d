/// Room lifecycle transitions.
pub mod room_machine;

use std::sync::Arc;

use crate::{
    cache::RoomCache,
    config::AppConfig,
    dao::debate_store::DebateStore,
    services::judgment_pool::JudgmentPool,
};

/// Handle to [`AppState`] cloned into every request.
pub type SharedState = Arc<AppState>;

/// Handles shared by every request: durable store, cache, and the judgment queue.
///
/// Holds no per-room state; every operation reloads what it needs from the store.
pub struct AppState {
    store: Arc<dyn DebateStore>,
    cache: RoomCache,
    judgments: JudgmentPool,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        store: Arc<dyn DebateStore>,
        cache: RoomCache,
        judgments: JudgmentPool,
        config: AppConfig,
    ) -> SharedState {
        Arc::new(Self {
            store,
            cache,
            judgments,
            config,
        })
    }

    /// Durable store.
    pub fn store(&self) -> &Arc<dyn DebateStore> {
        &self.store
    }

    /// Room cache.
    pub fn cache(&self) -> &RoomCache {
        &self.cache
    }

    /// Queue feeding the background judgment workers.
    pub fn judgments(&self) -> &JudgmentPool {
        &self.judgments
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
