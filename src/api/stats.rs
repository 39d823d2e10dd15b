use axum::{Json, extract::State};
use serde::Serialize;

use crate::app::AppState;
use crate::jobs::StoreStats;
use crate::ratelimit::RateLimiterStats;

#[derive(Debug, Serialize)]
pub(crate) struct StatsReport {
    jobs: StoreStats,
    rate_limiter: RateLimiterStats,
}

pub(crate) async fn report(State(state): State<AppState>) -> Json<StatsReport> {
    Json(StatsReport {
        jobs: state.store().stats(),
        rate_limiter: state.rate_limiter().stats(),
    })
}
