//! Shared harness: boots the gateway on an ephemeral port and drives it
//! with a `tokio-tungstenite` client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sb_domain::config::Config;
use sb_gateway::bootstrap;
use sb_gateway::state::AppState;
use sb_protocol::SignalMessage;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

pub async fn start(config: Config) -> (SocketAddr, AppState) {
    let state = bootstrap::build_app_state(Arc::new(config)).await.unwrap();
    let app = bootstrap::app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn open(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

pub async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next signal message; `None` once the server closed the socket.
pub async fn next(ws: &mut Ws) -> Option<SignalMessage> {
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Skip messages until `signal` arrives.
pub async fn expect_signal(ws: &mut Ws, signal: &str) -> SignalMessage {
    loop {
        match next(ws).await {
            Some(msg) if msg.signal == signal => return msg,
            Some(_) => continue,
            None => panic!("socket closed while waiting for {signal}"),
        }
    }
}

/// Connect a session and return its id.
pub async fn connect_session(ws: &mut Ws, requested: Value) -> String {
    send(ws, serde_json::json!({ "connect": requested })).await;
    let ack = expect_signal(ws, "__connect").await;
    ack.payload["session_id"].as_str().unwrap().to_owned()
}

/// Nothing arrives within `window`.
pub async fn assert_silent(ws: &mut Ws, window: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(window, ws.next()).await {
        panic!("unexpected frame: {text}");
    }
}

/// The server closes the socket within [`WAIT`].
pub async fn assert_closed(ws: &mut Ws) {
    tokio::time::timeout(WAIT, async {
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                return;
            }
        }
    })
    .await
    .expect("socket was not closed");
}
