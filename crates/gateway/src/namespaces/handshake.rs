//! Bridge ↔ worker handshake.
//!
//! A subscriber connecting to a publisher misses whatever was published
//! before the connection landed, so neither side can assume its first
//! message arrives. The bridge therefore repeats its init message every
//! interval until the first inbound line shows that the worker's publisher
//! reaches the bridge's subscriber.

use std::time::Duration;

use sb_bus::{Publisher, Subscriber};
use sb_protocol::InitMessage;
use tokio::process::Child;

use super::bridge::BridgeError;

pub struct Handshake<'a> {
    pub namespace: &'a str,
    pub publish_on_port: u16,
    pub interval: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Handshake<'_> {
    /// Publish init until something arrives on `subscriber`.
    ///
    /// Returns the first inbound line so the caller can demultiplex it like
    /// any other. Fails when the timeout elapses or the launched worker
    /// exits first.
    pub async fn run(
        &self,
        publisher: &Publisher,
        subscriber: &mut Subscriber,
        mut worker: Option<&mut Child>,
    ) -> Result<String, BridgeError> {
        let init = InitMessage {
            namespace: self.namespace.to_owned(),
            publish_on_port: self.publish_on_port,
        };
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                line = subscriber.recv() => {
                    let line = line.ok_or(BridgeError::SubscriberClosed)?;
                    tracing::info!(
                        namespace = %self.namespace,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "bridge handshake complete"
                    );
                    return Ok(line);
                }
                status = wait_worker(&mut worker) => {
                    return Err(BridgeError::WorkerExited {
                        namespace: self.namespace.to_owned(),
                        status,
                    });
                }
                _ = ticker.tick() => {
                    if let Some(limit) = self.timeout {
                        if started.elapsed() >= limit {
                            return Err(BridgeError::HandshakeTimeout {
                                namespace: self.namespace.to_owned(),
                                after: limit,
                            });
                        }
                    }
                    attempts += 1;
                    publisher.publish(&init)?;
                    tracing::trace!(namespace = %self.namespace, attempts, "init published");
                }
            }
        }
    }
}

/// Resolves when the worker exits; pends forever without one.
async fn wait_worker(worker: &mut Option<&mut Child>) -> String {
    match worker {
        Some(child) => match child.wait().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {e}"),
        },
        None => std::future::pending().await,
    }
}
