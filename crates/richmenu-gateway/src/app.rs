use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use richmenu_core::config::RichMenuConfig;
use richmenu_scheduler::SchedulerHandle;

/// Shared state passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: RichMenuConfig,
    pub scheduler: SchedulerHandle,
}

impl AppState {
    pub fn new(config: RichMenuConfig, scheduler: SchedulerHandle) -> Self {
        Self { config, scheduler }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/schedules/{id}/run-now",
            post(crate::http::schedules::run_now_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
