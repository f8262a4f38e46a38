//! Core worker client: runs the bridge handshake, keeps the worker-side
//! session map and dispatches envelopes via a [`SignalTable`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sb_analysis::{
    spawn_dispatch, DispatchError, Emit, RequestArgs, Session, SignalTable, TransportClosed,
    TryEmitError,
};
use sb_bus::{Publisher, Subscriber};
use sb_protocol::{
    BridgeEnvelope, BusFrame, InitMessage, ReadyMessage, SignalMessage, CONNECT_SIGNAL,
    DISCONNECT_SIGNAL,
};
use tokio_util::sync::CancellationToken;

use crate::types::WorkerSdkError;

/// A fully-configured worker ready to reach its bridge.
///
/// Create via [`WorkerClientBuilder`](crate::builder::WorkerClientBuilder).
pub struct WorkerClient {
    pub(crate) bridge_host: String,
    pub(crate) bridge_port: u16,
    pub(crate) namespace: String,
    pub(crate) publish_host: String,
    pub(crate) retry_interval: Duration,
    pub(crate) cli_args: Vec<String>,
}

/// Datastore key under which every session sees the worker's CLI args.
pub const CLI_ARGS_KEY: &str = "cli_args";

/// Publishes a session's emits back to the bridge.
struct BridgeEmitter {
    publisher: Arc<Publisher>,
    session_id: String,
    namespace: String,
}

#[async_trait]
impl Emit for BridgeEmitter {
    async fn emit(&self, message: SignalMessage) -> Result<(), TransportClosed> {
        self.try_emit(message).map_err(|_| TransportClosed)
    }

    /// Publishing never waits: a lagging bridge drops lines on the bus side.
    fn try_emit(&self, message: SignalMessage) -> Result<(), TryEmitError> {
        let envelope = BridgeEnvelope {
            session_id: self.session_id.clone(),
            namespace: self.namespace.clone(),
            payload: message,
        };
        self.publisher.publish(&envelope).map_err(|e| {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to publish envelope");
            TryEmitError::Closed
        })?;
        Ok(())
    }
}

/// Mutable state of one `run`.
struct Worker {
    namespace: String,
    publish_host: String,
    table: Arc<SignalTable>,
    publisher: Option<Arc<Publisher>>,
    sessions: HashMap<String, Session>,
    cli_args: Vec<String>,
}

impl WorkerClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::WorkerClientBuilder {
        crate::builder::WorkerClientBuilder::new()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Run the worker until `shutdown` is cancelled.
    ///
    /// Returns `Err(Shutdown)` on cancellation; any other error is fatal
    /// (bad bridge address, publisher port unavailable).
    pub async fn run(
        self,
        table: SignalTable,
        shutdown: CancellationToken,
    ) -> Result<(), WorkerSdkError> {
        let bridge = sb_bus::resolve(&self.bridge_host, self.bridge_port)?;
        tracing::info!(
            bridge = %bridge,
            namespace = %self.namespace,
            signals = ?table.signal_names(),
            "connecting to bridge"
        );

        let mut subscriber = Subscriber::connect(bridge, self.retry_interval);
        let mut worker = Worker {
            namespace: self.namespace.clone(),
            publish_host: self.publish_host.clone(),
            table: Arc::new(table),
            publisher: None,
            sessions: HashMap::new(),
            cli_args: self.cli_args.clone(),
        };

        let result = loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(namespace = %self.namespace, "shutdown requested");
                    break Err(WorkerSdkError::Shutdown);
                }
                line = subscriber.recv() => line,
            };
            let Some(line) = line else {
                break Err(WorkerSdkError::BridgeClosed);
            };

            match serde_json::from_str::<BusFrame>(&line) {
                Ok(frame) if frame.namespace() != worker.namespace => {
                    tracing::trace!(namespace = %frame.namespace(), "ignoring frame for another namespace");
                }
                Ok(BusFrame::Init(init)) => {
                    if let Err(e) = worker.on_init(init).await {
                        break Err(e);
                    }
                }
                Ok(BusFrame::Envelope(envelope)) => worker.on_envelope(envelope).await,
                Ok(BusFrame::Ready(_)) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "failed to parse bridge frame");
                }
            }
        };

        worker.close_all().await;
        subscriber.close();
        result
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle`.
    pub fn spawn(
        self,
        table: SignalTable,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), WorkerSdkError>> {
        tokio::spawn(async move { self.run(table, shutdown).await })
    }
}

impl Worker {
    async fn on_init(&mut self, init: InitMessage) -> Result<(), WorkerSdkError> {
        let publisher = match &self.publisher {
            Some(p) => p.clone(),
            None => {
                let addr = sb_bus::resolve(&self.publish_host, init.publish_on_port)?;
                let publisher = Arc::new(Publisher::bind(addr).await?);
                tracing::info!(
                    namespace = %self.namespace,
                    addr = %publisher.local_addr(),
                    "worker publisher bound"
                );
                self.publisher = Some(publisher.clone());
                publisher
            }
        };
        publisher.publish(&ReadyMessage {
            namespace: self.namespace.clone(),
            ready: true,
        })?;
        Ok(())
    }

    async fn on_envelope(&mut self, envelope: BridgeEnvelope) {
        let BridgeEnvelope {
            session_id,
            payload: SignalMessage { signal, payload },
            ..
        } = envelope;

        match signal.as_str() {
            CONNECT_SIGNAL => self.connect(session_id, payload).await,
            DISCONNECT_SIGNAL => self.disconnect(&session_id).await,
            _ => {
                let Some(session) = self.sessions.get(&session_id) else {
                    tracing::debug!(
                        session_id = %session_id,
                        signal = %signal,
                        "signal for unknown session, dropped"
                    );
                    return;
                };
                if let Err(DispatchError::UnknownSignal(name)) =
                    spawn_dispatch(&self.table, session, signal, payload)
                {
                    tracing::warn!(session_id = %session_id, signal = %name, "unknown signal");
                }
            }
        }
    }

    async fn connect(&mut self, session_id: String, request_args: serde_json::Value) {
        let Some(publisher) = self.publisher.clone() else {
            tracing::warn!(session_id = %session_id, "connect before handshake, dropped");
            return;
        };
        let request_args: RequestArgs = serde_json::from_value(request_args).unwrap_or_else(|e| {
            tracing::debug!(session_id = %session_id, error = %e, "malformed request args ignored");
            RequestArgs::new()
        });

        let session = Session::new(session_id.clone(), self.namespace.clone(), request_args);
        session.set_emitter(Arc::new(BridgeEmitter {
            publisher,
            session_id: session_id.clone(),
            namespace: self.namespace.clone(),
        }));

        if let Some(previous) = self.sessions.insert(session_id.clone(), session.clone()) {
            tracing::debug!(session_id = %session_id, "session id taken over");
            previous.close();
        }
        tracing::info!(session_id = %session_id, namespace = %self.namespace, "session connected");

        session.forward_data_changes();
        if !self.cli_args.is_empty() {
            if let Err(e) = session.data().set(CLI_ARGS_KEY, &self.cli_args) {
                tracing::debug!(session_id = %session_id, error = %e, "cli args not stored");
            }
        }

        if let Err(e) = self.table.connect(&session).await {
            tracing::warn!(session_id = %session_id, error = %e, "connect handler failed");
        }
    }

    async fn disconnect(&mut self, session_id: &str) {
        let Some(session) = self.sessions.remove(session_id) else {
            tracing::debug!(session_id = %session_id, "disconnect for unknown session");
            return;
        };
        if let Err(e) = self.table.disconnect(&session).await {
            tracing::warn!(session_id = %session_id, error = %e, "disconnect handler failed");
        }
        session.close();
        tracing::info!(session_id = %session_id, namespace = %self.namespace, "session disconnected");
    }

    async fn close_all(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }
}
