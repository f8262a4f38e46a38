//! Namespace listing.

use axum::extract::State;
use axum::response::Json;

use crate::namespaces::NamespaceInfo;
use crate::state::AppState;

/// GET /v1/namespaces: every served namespace, sorted by name.
pub async fn list_namespaces(State(state): State<AppState>) -> Json<Vec<NamespaceInfo>> {
    Json(state.namespaces.list())
}
