use std::sync::Arc;

use crate::cache::{CacheWarmer, ContentCacheService, PopularityTracker};

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentCacheService>,
    pub popularity: Arc<PopularityTracker>,
    pub warmer: Arc<CacheWarmer>,
    /// Bearer token for the warming trigger; `None` disables the endpoint.
    pub warm_token: Option<String>,
}
