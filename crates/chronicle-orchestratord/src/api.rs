//! Admin/health HTTP surface (SUPPLEMENTED FEATURES: `get_queue_health()`),
//! grounded on `gateway/src/api/admin/health.rs`'s public `/v1/health` probe
//! and protected `/v1/metrics`/`system_info` handlers.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Worker process statuses plus the RQ cluster's registered-worker count,
/// the same signal `HealthMonitor::tick` restarts on (§4.7).
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let workers = state.manager.get_status().await;
    let rq_worker_count = state.manager.rq_worker_count().await;

    let mut conn = state.redis.clone();
    let registered: usize = redis::cmd("SCARD")
        .arg("rq:workers")
        .query_async(&mut conn)
        .await
        .unwrap_or(0);

    Json(serde_json::json!({
        "workers": workers,
        "live_rq_workers": rq_worker_count,
        "registered_rq_workers": registered,
        "min_rq_workers": state.config.supervisor.min_rq_workers,
    }))
}
