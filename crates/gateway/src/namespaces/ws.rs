//! WebSocket endpoint for browser connections.
//!
//! Flow:
//! 1. Browser connects to `/<namespace>/ws?<request args>`
//! 2. Browser sends `{"connect": <id|null>}`
//! 3. Gateway answers `__connect {session_id}`
//! 4. Bidirectional loop: browser sends `{signal, payload}`, the analysis
//!    emits `{signal, payload}` back through the session

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use sb_analysis::RequestArgs;
use sb_protocol::SignalMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::router::{ConnectionRouter, RouterError};
use super::Namespace;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How long the writer may take to flush queued messages after close.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_frame_bytes: usize,
    outbound_buffer: usize,
}

/// GET /:namespace/ws: upgrade to WebSocket.
///
/// Query parameters become the session's request args; repeated keys keep
/// every value in order.
pub async fn namespace_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let Some(namespace) = state.namespaces.get(&name) else {
        tracing::debug!(namespace = %name, "websocket for unknown namespace");
        return (StatusCode::NOT_FOUND, format!("unknown namespace '{name}'")).into_response();
    };

    let limits = Limits {
        max_frame_bytes: state.config.server.max_frame_bytes,
        outbound_buffer: state.config.server.outbound_buffer,
    };
    let request_args = collect_request_args(query);

    ws.on_upgrade(move |socket| handle_socket(socket, namespace, request_args, limits))
        .into_response()
}

pub(crate) fn collect_request_args(query: Vec<(String, String)>) -> RequestArgs {
    let mut args = RequestArgs::new();
    for (key, value) in query {
        args.entry(key).or_default().push(value);
    }
    args
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(
    socket: WebSocket,
    namespace: Arc<Namespace>,
    request_args: RequestArgs,
    limits: Limits,
) {
    let conn_id = Uuid::new_v4();
    let (mut ws_sink, mut ws_stream) = socket.split();

    if namespace.is_failed() {
        tracing::warn!(
            conn_id = %conn_id,
            namespace = %namespace.name(),
            "namespace worker has failed, closing connection"
        );
        let _ = ws_sink.send(Message::Close(None)).await;
        return;
    }

    tracing::debug!(conn_id = %conn_id, namespace = %namespace.name(), "websocket opened");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<SignalMessage>(limits.outbound_buffer);
    let done = CancellationToken::new();

    // Writer task: drains the outbound queue into the socket. Queued messages
    // go out before the close frame.
    let mut writer = tokio::spawn({
        let done = done.clone();
        async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    msg = outbound_rx.recv() => msg,
                    _ = done.cancelled() => None,
                };
                let Some(msg) = msg else { break };
                if send_ws_message(&mut ws_sink, &msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        }
    });

    let mut router = ConnectionRouter::new(namespace.clone(), outbound_tx, request_args);

    // Reader loop. Also ends when the gateway closes the session (takeover,
    // worker failure, shutdown).
    loop {
        let closed = router.session().map(|s| s.cancel_token().clone());
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = session_closed(closed) => {
                tracing::debug!(conn_id = %conn_id, "session closed by gateway");
                break;
            }
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::debug!(conn_id = %conn_id, "ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "websocket read failed");
                break;
            }
        };

        if text.len() > limits.max_frame_bytes {
            tracing::warn!(
                conn_id = %conn_id,
                bytes = text.len(),
                limit = limits.max_frame_bytes,
                "oversized frame dropped"
            );
            continue;
        }

        match router.handle_text(&text).await {
            Ok(()) => {}
            Err(RouterError::Bridge(e)) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "bridge unavailable, closing");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    conn_id = %conn_id,
                    session_id = router.session().map(|s| s.id()).unwrap_or("-"),
                    error = %e,
                    "frame ignored"
                );
            }
        }
    }

    // Cleanup: run the disconnect path, then let the writer flush and close.
    router.close().await;
    drop(router);
    done.cancel();
    match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "writer task ended abnormally");
        }
        Err(_) => {
            tracing::debug!(conn_id = %conn_id, "writer flush timed out, dropping socket");
            writer.abort();
        }
    }
    tracing::debug!(conn_id = %conn_id, namespace = %namespace.name(), "websocket closed");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn session_closed(token: Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn send_ws_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &SignalMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
