//! Process bridge: multiplexes every session of a namespace onto one worker.
//!
//! ```text
//!  browser ─ws─▶ router ──forward──▶ Publisher ══bus══▶ worker
//!  browser ◀─ws─ session ◀─demux─── Subscriber ◀═bus══ worker
//! ```
//!
//! Outbound, the router wraps each signal in a [`BridgeEnvelope`] tagged with
//! the session id. Inbound, one demux task reads the subscriber and hands the
//! inner message to the session with the matching id. The demux never waits
//! on a session: a browser that stops reading loses its session, not the
//! namespace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sb_analysis::{Session, TryEmitError};
use sb_bus::{BusError, Publisher, Subscriber};
use sb_domain::config::NamespaceConfig;
use sb_protocol::{BridgeEnvelope, BusFrame, SignalMessage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::handshake::Handshake;
use super::launcher;
use super::registry::SessionRegistry;

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    #[error("failed to launch worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("namespace '{namespace}': no handshake from worker after {after:?}")]
    HandshakeTimeout { namespace: String, after: Duration },
    #[error("namespace '{namespace}': worker exited during handshake ({status})")]
    WorkerExited { namespace: String, status: String },
    #[error("bridge subscriber closed")]
    SubscriberClosed,
    #[error("namespace '{0}': worker process failed")]
    Failed(String),
}

pub struct Bridge {
    namespace: String,
    publisher: Publisher,
    sessions: Arc<SessionRegistry>,
    failed: AtomicBool,
    shutdown: CancellationToken,
}

impl Bridge {
    /// Bind, launch the worker (if a command is configured), handshake, and
    /// start the demux task.
    pub async fn start(
        config: &NamespaceConfig,
        sessions: Arc<SessionRegistry>,
    ) -> Result<Arc<Self>, BridgeError> {
        let namespace = config.name.as_str();
        let bc = &config.bridge;

        // ── Publish socket ───────────────────────────────────────────
        let publish_addr = sb_bus::resolve(&bc.publish_host, bc.publish_port)?;
        let publisher = Publisher::bind(publish_addr).await?;

        // ── Subscribe socket ─────────────────────────────────────────
        let subscribe_port = match bc.subscribe_port {
            Some(port) => port,
            None => sb_bus::reserve_port(&bc.publish_host)?,
        };
        let subscribe_addr = sb_bus::resolve(&bc.publish_host, subscribe_port)?;
        let mut subscriber = Subscriber::connect(subscribe_addr, bc.handshake_interval());

        tracing::info!(
            namespace = %namespace,
            publish = %publisher.local_addr(),
            subscribe = %subscribe_addr,
            "bridge sockets ready"
        );

        // ── Worker ───────────────────────────────────────────────────
        let mut worker = match &bc.command {
            Some(command) => Some(launcher::launch(
                namespace,
                bc,
                command,
                publisher.local_addr(),
            )?),
            None => {
                tracing::info!(
                    namespace = %namespace,
                    bridge = %publisher.local_addr(),
                    "no worker command configured, waiting for an external worker"
                );
                None
            }
        };

        // ── Handshake ────────────────────────────────────────────────
        let first_line = Handshake {
            namespace,
            publish_on_port: subscribe_port,
            interval: bc.handshake_interval(),
            timeout: bc.handshake_timeout(),
        }
        .run(&publisher, &mut subscriber, worker.as_mut())
        .await?;

        let bridge = Arc::new(Self {
            namespace: namespace.to_owned(),
            publisher,
            sessions,
            failed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });

        spawn_demux(bridge.clone(), subscriber, first_line);
        if let Some(child) = worker {
            launcher::monitor(child, Arc::downgrade(&bridge), bridge.shutdown.clone());
        }

        Ok(bridge)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Wrap `message` for `session_id` and publish it to the worker.
    pub fn forward(&self, session_id: &str, message: SignalMessage) -> Result<(), BridgeError> {
        if self.is_failed() {
            return Err(BridgeError::Failed(self.namespace.clone()));
        }
        let signal = message.signal.clone();
        let delivered = self.publisher.publish(&BridgeEnvelope {
            session_id: session_id.to_owned(),
            namespace: self.namespace.clone(),
            payload: message,
        })?;
        if delivered == 0 {
            tracing::debug!(
                namespace = %self.namespace,
                session_id = %session_id,
                signal = %signal,
                "no worker subscribed, envelope dropped"
            );
        }
        Ok(())
    }

    /// Mark the worker as failed and close every session of the namespace.
    pub fn fail(&self, reason: &str) {
        if self.failed.swap(true, Ordering::AcqRel) {
            return;
        }
        let closed = self.sessions.close_all();
        tracing::error!(
            namespace = %self.namespace,
            reason = %reason,
            sessions_closed = closed,
            "worker process failed"
        );
    }

    /// Stop the demux task and kill a launched worker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.publisher.shutdown();
    }

    /// Route one inbound line to its session.
    fn demux(&self, line: &str) {
        let frame = match serde_json::from_str::<BusFrame>(line) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(namespace = %self.namespace, error = %e, "unparseable bridge line");
                return;
            }
        };
        if frame.namespace() != self.namespace {
            tracing::trace!(
                namespace = %self.namespace,
                other = %frame.namespace(),
                "frame for another namespace ignored"
            );
            return;
        }
        let BusFrame::Envelope(envelope) = frame else {
            return;
        };

        let Some(session) = self.sessions.get(&envelope.session_id) else {
            tracing::debug!(
                namespace = %self.namespace,
                session_id = %envelope.session_id,
                signal = %envelope.payload.signal,
                "bridge demux miss, message dropped"
            );
            return;
        };
        deliver(&session, envelope.payload);
    }
}

/// Hand a worker message to its session without waiting.
///
/// A session whose outbound queue is full is closed instead of stalling the
/// demux for every other session.
fn deliver(session: &Session, message: SignalMessage) {
    let signal = message.signal.clone();
    match session.try_emit_message(message) {
        Ok(()) => {}
        Err(TryEmitError::Full) => {
            tracing::warn!(
                session_id = %session.id(),
                signal = %signal,
                "session outbound queue full, closing lagging session"
            );
            session.close();
        }
        Err(TryEmitError::Closed) => {
            tracing::debug!(session_id = %session.id(), signal = %signal, "session gone, message dropped");
        }
    }
}

fn spawn_demux(bridge: Arc<Bridge>, mut subscriber: Subscriber, first_line: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        bridge.demux(&first_line);
        loop {
            let line = tokio::select! {
                _ = bridge.shutdown.cancelled() => break,
                line = subscriber.recv() => line,
            };
            match line {
                Some(line) => bridge.demux(&line),
                None => break,
            }
        }
        subscriber.close();
        tracing::debug!(namespace = %bridge.namespace, "bridge demux stopped");
    })
}
