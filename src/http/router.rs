//! Router assembly: routes, timeouts, and tracing (C8).

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers::{event_handler, ready_handler};
use crate::worker::WorkerPool;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
}

pub fn build_router(pool: Arc<WorkerPool>) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/_/ready", get(ready_handler))
        .route("/v1/event", post(event_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}
