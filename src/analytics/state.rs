//! Shared application state for the analytics engine: the store adapter, the
//! response cache, and the resolved configuration, mirroring the shape of
//! `infrastructure::state::AppState` from the legacy workflow service.

use std::sync::Arc;

use crate::analytics::cache::ResponseCache;
use crate::analytics::store::StoreAdapter;
use crate::infrastructure::analytics_config::AnalyticsConfig;

pub struct AnalyticsState {
    pub config: Arc<AnalyticsConfig>,
    pub store: Arc<dyn StoreAdapter>,
    pub cache: ResponseCache,
}

impl AnalyticsState {
    pub fn new(config: Arc<AnalyticsConfig>, store: Arc<dyn StoreAdapter>) -> Self {
        let cache = ResponseCache::new(config.cache_ttl(), config.cache_soft_capacity);
        Self {
            config,
            store,
            cache,
        }
    }
}
