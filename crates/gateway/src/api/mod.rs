pub mod health;
pub mod namespaces;

use axum::routing::get;
use axum::Router;

use crate::namespaces::ws;
use crate::state::AppState;

/// Build the full router: the REST surface under `/v1` and one WebSocket
/// endpoint per namespace.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/namespaces", get(namespaces::list_namespaces))
        .route("/:namespace/ws", get(ws::namespace_ws))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use sb_domain::config::Config;
    use tower::ServiceExt;

    use super::*;
    use crate::builtin;
    use crate::namespaces::NamespaceRegistry;

    fn app() -> Router {
        let mut namespaces = NamespaceRegistry::new();
        namespaces.insert(builtin::echo_namespace()).unwrap();
        router().with_state(AppState {
            config: Arc::new(Config::default()),
            namespaces: Arc::new(namespaces),
            started_at: Utc::now(),
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn namespaces_lists_builtin_echo() {
        let (status, body) = get_json("/v1/namespaces").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "echo");
        assert_eq!(body[0]["bridged"], false);
        assert_eq!(body[0]["sessions"], 0);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json("/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["namespaces"], 1);
        assert!(body["uptime_secs"].is_number());
    }
}
