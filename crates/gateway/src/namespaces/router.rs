//! Per-connection router: the UNCONNECTED → CONNECTED → CLOSED state machine.
//!
//! The router owns no socket. Inbound text frames are fed to
//! [`ConnectionRouter::handle_text`]; everything addressed to the browser
//! goes through the `outbound` channel given at construction, which the
//! WebSocket writer task drains.

use std::sync::Arc;

use sb_analysis::{spawn_dispatch, DispatchError, RequestArgs, Session};
use sb_protocol::{ClientFrame, ProtocolError, SignalMessage, CONNECT_SIGNAL, DISCONNECT_SIGNAL};
use serde_json::Value;
use tokio::sync::mpsc;

use super::bridge::BridgeError;
use super::{Backend, Namespace};

#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unknown signal: {0}")]
    UnknownSignal(String),
    #[error("bridge: {0}")]
    Bridge(#[from] BridgeError),
}

enum State {
    Unconnected,
    Connected(Session),
    Closed,
}

pub struct ConnectionRouter {
    namespace: Arc<Namespace>,
    outbound: mpsc::Sender<SignalMessage>,
    request_args: RequestArgs,
    state: State,
}

impl ConnectionRouter {
    pub fn new(
        namespace: Arc<Namespace>,
        outbound: mpsc::Sender<SignalMessage>,
        request_args: RequestArgs,
    ) -> Self {
        Self {
            namespace,
            outbound,
            request_args,
            state: State::Unconnected,
        }
    }

    /// The session once connected; `None` before connect and after close.
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Connected(session) => Some(session),
            _ => None,
        }
    }

    pub async fn handle_text(&mut self, text: &str) -> Result<(), RouterError> {
        match ClientFrame::parse(text)? {
            ClientFrame::Connect { session_id } => self.connect(session_id).await,
            ClientFrame::Signal { signal, payload } => self.signal(signal, payload),
        }
    }

    async fn connect(&mut self, requested: Option<String>) -> Result<(), RouterError> {
        match self.state {
            State::Unconnected => {}
            State::Connected(_) => return Err(ProtocolError::AlreadyConnected.into()),
            State::Closed => return Err(ProtocolError::NotConnected.into()),
        }

        let session = self
            .namespace
            .sessions()
            .connect(requested, self.request_args.clone())
            .session;
        session.set_emitter(Arc::new(self.outbound.clone()));
        self.state = State::Connected(session.clone());

        match self.namespace.backend() {
            Backend::Local(table) => {
                session.forward_data_changes();
                if let Err(e) = table.connect(&session).await {
                    tracing::warn!(
                        namespace = %self.namespace.name(),
                        session_id = %session.id(),
                        error = %e,
                        "connect handler failed"
                    );
                }
            }
            Backend::Bridged(bridge) => {
                let args = serde_json::to_value(&self.request_args).unwrap_or_default();
                bridge.forward(session.id(), SignalMessage::new(CONNECT_SIGNAL, args))?;
            }
        }

        session
            .emit_message(SignalMessage::connect_ack(session.id()))
            .await;
        tracing::info!(
            namespace = %self.namespace.name(),
            session_id = %session.id(),
            "session connected"
        );
        Ok(())
    }

    fn signal(&mut self, signal: String, payload: Value) -> Result<(), RouterError> {
        let State::Connected(session) = &self.state else {
            return Err(ProtocolError::NotConnected.into());
        };

        match self.namespace.backend() {
            Backend::Local(table) => match spawn_dispatch(table, session, signal, payload) {
                Ok(_task) => Ok(()),
                Err(DispatchError::UnknownSignal(name)) => Err(RouterError::UnknownSignal(name)),
                Err(DispatchError::Handler(e)) => {
                    tracing::warn!(session_id = %session.id(), error = %e, "dispatch failed");
                    Ok(())
                }
            },
            Backend::Bridged(bridge) => {
                bridge.forward(session.id(), SignalMessage::new(signal, payload))?;
                Ok(())
            }
        }
    }

    /// Run the disconnect path once: disconnect hook (or `__disconnect` to
    /// the worker), cancel, then unregister. Later calls are no-ops.
    pub async fn close(&mut self) {
        let State::Connected(session) = std::mem::replace(&mut self.state, State::Closed) else {
            return;
        };
        let still_owner = self
            .namespace
            .sessions()
            .get(session.id())
            .is_some_and(|live| live.same_as(&session));

        match self.namespace.backend() {
            Backend::Local(table) => {
                if let Err(e) = table.disconnect(&session).await {
                    tracing::warn!(session_id = %session.id(), error = %e, "disconnect handler failed");
                }
            }
            // A taken-over id now belongs to another connection; telling the
            // worker would end that session instead.
            Backend::Bridged(bridge) if still_owner => {
                if let Err(e) = bridge.forward(
                    session.id(),
                    SignalMessage::new(DISCONNECT_SIGNAL, Value::Object(Default::default())),
                ) {
                    tracing::debug!(session_id = %session.id(), error = %e, "disconnect not forwarded");
                }
            }
            Backend::Bridged(_) => {}
        }

        session.close();
        self.namespace.sessions().remove(&session);
        tracing::info!(
            namespace = %self.namespace.name(),
            session_id = %session.id(),
            "session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_analysis::{SignalTable, Signature};
    use serde_json::json;
    use std::time::Duration;

    fn echo_namespace() -> Arc<Namespace> {
        let mut table = SignalTable::new();
        table
            .on("run", Signature::new(["my_param"]), |session, args| async move {
                let p: String = args.value("my_param")?;
                session.emit("result", &json!({ "result": format!("done:{p}") })).await?;
                Ok(())
            })
            .on("slow", Signature::none(), |_, _| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .on("remember", Signature::new(["value"]), |session, args| async move {
                let value: Value = args.value("value")?;
                session.data().set("remembered", &value)?;
                Ok(())
            })
            .on_disconnect(|session| async move {
                session.data().set("closed_during_hook", &session.is_closed())?;
                Ok(())
            });
        Arc::new(Namespace::local("test", "", table))
    }

    fn router(ns: &Arc<Namespace>) -> (ConnectionRouter, mpsc::Receiver<SignalMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionRouter::new(ns.clone(), tx, RequestArgs::new()), rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<SignalMessage>) -> SignalMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn connect_acks_with_generated_id() {
        let ns = echo_namespace();
        let (mut r, mut rx) = router(&ns);
        r.handle_text(r#"{"connect": null}"#).await.unwrap();

        let ack = recv(&mut rx).await;
        assert_eq!(ack.signal, "__connect");
        let id = ack.payload["session_id"].as_str().unwrap();
        assert_eq!(id.len(), 8);
        assert!(ns.sessions().get(id).is_some());
    }

    #[tokio::test]
    async fn signal_before_connect_is_rejected() {
        let ns = echo_namespace();
        let (mut r, _rx) = router(&ns);
        let err = r
            .handle_text(r#"{"signal": "run", "payload": {"my_param": "x"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Protocol(ProtocolError::NotConnected)));
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let ns = echo_namespace();
        let (mut r, _rx) = router(&ns);
        r.handle_text(r#"{"connect": "abc"}"#).await.unwrap();
        let err = r.handle_text(r#"{"connect": "def"}"#).await.unwrap_err();
        assert!(matches!(err, RouterError::Protocol(ProtocolError::AlreadyConnected)));
        assert_eq!(r.session().unwrap().id(), "abc");
    }

    #[tokio::test]
    async fn run_signal_reaches_handler() {
        let ns = echo_namespace();
        let (mut r, mut rx) = router(&ns);
        r.handle_text(r#"{"connect": null}"#).await.unwrap();
        recv(&mut rx).await;

        r.handle_text(r#"{"signal": "run", "payload": {"my_param": "helloworld"}}"#)
            .await
            .unwrap();
        let msg = recv(&mut rx).await;
        assert_eq!(msg, SignalMessage::new("result", json!({"result": "done:helloworld"})));
    }

    #[tokio::test]
    async fn unknown_signal_is_reported() {
        let ns = echo_namespace();
        let (mut r, _rx) = router(&ns);
        r.handle_text(r#"{"connect": null}"#).await.unwrap();
        let err = r
            .handle_text(r#"{"signal": "nope", "payload": null}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownSignal(ref s) if s == "nope"));
    }

    #[tokio::test]
    async fn close_cancels_running_handlers_and_unregisters() {
        let ns = echo_namespace();
        let (mut r, _rx) = router(&ns);
        r.handle_text(r#"{"connect": "keep"}"#).await.unwrap();
        r.handle_text(r#"{"signal": "slow", "payload": {}}"#).await.unwrap();
        let session = r.session().unwrap().clone();

        r.close().await;
        assert!(session.cancel_token().is_cancelled());
        assert!(ns.sessions().get("keep").is_none());
        assert!(r.session().is_none());

        let err = r.handle_text(r#"{"connect": null}"#).await.unwrap_err();
        assert!(matches!(err, RouterError::Protocol(ProtocolError::NotConnected)));
    }

    #[tokio::test]
    async fn datastore_changes_are_sent_as_data_signal() {
        let ns = echo_namespace();
        let (mut r, mut rx) = router(&ns);
        r.handle_text(r#"{"connect": null}"#).await.unwrap();
        recv(&mut rx).await;

        r.handle_text(r#"{"signal": "remember", "payload": {"value": [1, 2]}}"#)
            .await
            .unwrap();
        let msg = recv(&mut rx).await;
        assert_eq!(msg, SignalMessage::new("__data", json!({"remembered": [1, 2]})));
    }

    #[tokio::test]
    async fn disconnect_hook_runs_before_cancel_and_removal() {
        let ns = echo_namespace();
        let (mut r, _rx) = router(&ns);
        r.handle_text(r#"{"connect": "ordered"}"#).await.unwrap();
        let session = r.session().unwrap().clone();
        let registry = ns.sessions().clone();
        let seen_registered = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let sink = seen_registered.clone();
        session.data().on_change(move |key, _| {
            if key == "closed_during_hook" {
                *sink.lock() = Some(registry.get("ordered").is_some());
            }
        });

        r.close().await;
        assert_eq!(session.data().get("closed_during_hook"), Some(json!(false)));
        assert_eq!(*seen_registered.lock(), Some(true));
        assert!(session.is_closed());
        assert!(ns.sessions().get("ordered").is_none());
    }

    #[tokio::test]
    async fn takeover_leaves_successor_registered() {
        let ns = echo_namespace();
        let (mut first, _rx1) = router(&ns);
        let (mut second, _rx2) = router(&ns);
        first.handle_text(r#"{"connect": "same"}"#).await.unwrap();
        second.handle_text(r#"{"connect": "same"}"#).await.unwrap();

        assert!(first.session().unwrap().is_closed());
        first.close().await;
        let live = ns.sessions().get("same").unwrap();
        assert!(live.same_as(second.session().unwrap()));
    }
}
