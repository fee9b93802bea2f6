use std::sync::Arc;

use alert_engine::{AlertScheduler, PriceSource, WatchRegistry};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<WatchRegistry>,
    pub prices: Arc<dyn PriceSource>,
    pub scheduler: Arc<AlertScheduler>,
}

// Axum state must be cheap to clone and shareable across worker threads.
#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
