//! Per-connection session context.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sb_protocol::{sanitize, SanitizeError, SignalMessage};
use tokio::sync::mpsc::error::TrySendError;

use crate::datastore::Datastore;

/// Query-string arguments of the originating HTTP request, name → values.
pub type RequestArgs = BTreeMap<String, Vec<String>>;

const SESSION_ID_LEN: usize = 8;

/// Random 8-character alphanumeric session id.
pub fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// The underlying transport for a session is gone.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transport closed")]
pub struct TransportClosed;

/// Why a non-blocking emit did not go through.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryEmitError {
    #[error("transport queue full")]
    Full,
    #[error("transport closed")]
    Closed,
}

/// Outbound side of a session: a browser socket, or a bridge publisher.
#[async_trait]
pub trait Emit: Send + Sync + 'static {
    /// Send, waiting for queue space.
    async fn emit(&self, message: SignalMessage) -> Result<(), TransportClosed>;

    /// Send without waiting.
    fn try_emit(&self, message: SignalMessage) -> Result<(), TryEmitError>;
}

#[async_trait]
impl Emit for mpsc::Sender<SignalMessage> {
    async fn emit(&self, message: SignalMessage) -> Result<(), TransportClosed> {
        self.send(message).await.map_err(|_| TransportClosed)
    }

    fn try_emit(&self, message: SignalMessage) -> Result<(), TryEmitError> {
        self.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => TryEmitError::Full,
            TrySendError::Closed(_) => TryEmitError::Closed,
        })
    }
}

/// One logical browser connection within a namespace.
///
/// Cloning is cheap and every clone refers to the same session;
/// use [`Session::same_as`] for identity.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    namespace: String,
    request_args: RequestArgs,
    emitter: RwLock<Option<Arc<dyn Emit>>>,
    data: Datastore,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        request_args: RequestArgs,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                namespace: namespace.into(),
                request_args,
                emitter: RwLock::new(None),
                data: Datastore::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn request_args(&self) -> &RequestArgs {
        &self.inner.request_args
    }

    /// First value of a query-string argument.
    pub fn request_arg(&self, name: &str) -> Option<&str> {
        self.inner
            .request_args
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn data(&self) -> &Datastore {
        &self.inner.data
    }

    /// Cancelled when the session closes. Handlers may watch it directly.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Close the session: running handlers are cancelled and further emits
    /// are dropped.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.emitter.write().take();
    }

    pub fn set_emitter(&self, emitter: Arc<dyn Emit>) {
        if self.is_closed() {
            return;
        }
        *self.inner.emitter.write() = Some(emitter);
    }

    /// Mirror every datastore change to the frontend as `__data {key: value}`.
    ///
    /// Changes are sent without waiting; one that finds the transport full
    /// is dropped.
    pub fn forward_data_changes(&self) {
        let inner = Arc::downgrade(&self.inner);
        self.inner.data.on_change(move |key, value| {
            let Some(inner) = inner.upgrade() else { return };
            let session = Session { inner };
            let message = SignalMessage::data_change(key, value.clone());
            if let Err(e) = session.try_emit_message(message) {
                tracing::debug!(session_id = %session.id(), key = %key, error = %e, "data change not sent");
            }
        });
    }

    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sanitize `payload` and send `signal` to the frontend.
    ///
    /// A closed transport is not an error: the message is dropped.
    pub async fn emit<T: Serialize + ?Sized>(
        &self,
        signal: &str,
        payload: &T,
    ) -> Result<(), SanitizeError> {
        let payload = sanitize(payload)?;
        self.emit_message(SignalMessage::new(signal, payload)).await;
        Ok(())
    }

    /// Send an already-JSON-safe message. Dropped when the transport is gone.
    pub async fn emit_message(&self, message: SignalMessage) {
        let emitter = self.inner.emitter.read().clone();
        let Some(emitter) = emitter else {
            tracing::debug!(
                session_id = %self.id(),
                signal = %message.signal,
                "no transport, message dropped"
            );
            return;
        };
        if emitter.emit(message).await.is_err() {
            tracing::debug!(session_id = %self.id(), "transport closed, message dropped");
        }
    }

    /// Like [`emit_message`](Self::emit_message), but never waits for queue
    /// space.
    pub fn try_emit_message(&self, message: SignalMessage) -> Result<(), TryEmitError> {
        let emitter = self.inner.emitter.read().clone();
        match emitter {
            Some(emitter) => emitter.try_emit(message),
            None => Err(TryEmitError::Closed),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("namespace", &self.inner.namespace)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attached(capacity: usize) -> (Session, mpsc::Receiver<SignalMessage>) {
        let session = Session::new("abc12345", "test", RequestArgs::new());
        let (tx, rx) = mpsc::channel(capacity);
        session.set_emitter(Arc::new(tx));
        (session, rx)
    }

    #[test]
    fn session_ids_are_alphanumeric() {
        let id = generate_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn emit_sanitizes_payload() {
        let (session, mut rx) = attached(4);
        session
            .emit("result", &json!({"v": [1.5]}))
            .await
            .unwrap();
        session.emit("nan", &f64::INFINITY).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.signal, "result");
        assert_eq!(first.payload, json!({"v": [1.5]}));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload, json!("inf"));
    }

    #[tokio::test]
    async fn emit_after_transport_closed_is_dropped() {
        let (session, rx) = attached(1);
        drop(rx);
        session.emit("x", &1).await.unwrap();
    }

    #[tokio::test]
    async fn close_cancels_and_detaches() {
        let (session, mut rx) = attached(1);
        let clone = session.clone();
        session.close();
        assert!(clone.is_closed());
        assert!(clone.cancel_token().is_cancelled());
        clone.emit("x", &1).await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn try_emit_reports_full_queue_without_waiting() {
        let (session, mut rx) = attached(1);
        let msg = SignalMessage::new("x", json!(1));
        session.try_emit_message(msg.clone()).unwrap();
        assert_eq!(session.try_emit_message(msg.clone()), Err(TryEmitError::Full));

        assert_eq!(rx.recv().await.unwrap(), msg);
        drop(rx);
        assert_eq!(session.try_emit_message(msg.clone()), Err(TryEmitError::Closed));
        session.close();
        assert_eq!(session.try_emit_message(msg), Err(TryEmitError::Closed));
    }

    #[tokio::test]
    async fn data_changes_reach_the_frontend() {
        let (session, mut rx) = attached(4);
        session.forward_data_changes();
        session.data().set("cli_args", &["--flag"]).unwrap();
        session.data().remove("cli_args");

        assert_eq!(rx.recv().await.unwrap().payload, json!({"cli_args": ["--flag"]}));
        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.signal, "__data");
        assert_eq!(removed.payload, json!({"cli_args": null}));
    }

    #[test]
    fn identity_is_by_instance_not_id() {
        let a = Session::new("same", "ns", RequestArgs::new());
        let b = Session::new("same", "ns", RequestArgs::new());
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn request_arg_returns_first_value() {
        let mut args = RequestArgs::new();
        args.insert("user".into(), vec!["ada".into(), "bob".into()]);
        let session = Session::new("id", "ns", args);
        assert_eq!(session.request_arg("user"), Some("ada"));
        assert_eq!(session.request_arg("missing"), None);
    }
}
