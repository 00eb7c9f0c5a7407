pub mod filters;
pub mod health;
pub mod ingest;
pub mod logs;
pub mod ws;

use std::sync::Arc;

use crate::hub::Hub;
use crate::rate_limit::IpRateLimiter;
use crate::store::filter_cache::FilterOptionsCache;
use crate::store::LogStore;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LogStore>,
    pub hub: Hub,
    pub limiter: Arc<IpRateLimiter>,
    pub filter_cache: Arc<FilterOptionsCache>,
}
