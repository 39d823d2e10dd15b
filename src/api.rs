pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod pipeline;
pub(crate) mod stats;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/pipeline", post(pipeline::submit))
        .route("/v1/pipeline/{job_id}", get(pipeline::status))
        .route("/v1/pipeline/{job_id}", delete(pipeline::cancel))
        .route("/v1/stats", get(stats::report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
