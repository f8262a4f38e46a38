//! GET /v1/health: lightweight health probe.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let failed: Vec<String> = state
        .namespaces
        .list()
        .into_iter()
        .filter(|n| n.failed)
        .map(|n| n.name)
        .collect();

    Json(serde_json::json!({
        "status": if failed.is_empty() { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "namespaces": state.namespaces.len(),
        "failed_namespaces": failed,
    }))
}
