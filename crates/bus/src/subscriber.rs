//! Subscribing side of the bus.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::{BusError, MAX_LINE_BYTES};

const INBOX_BUFFER: usize = 1024;

/// Connected (or connecting) subscriber. Dropping it stops the reader.
pub struct Subscriber {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl Subscriber {
    /// Start reading from `addr`. Connection failures are retried every
    /// `retry`, so the publisher may come up after the subscriber.
    pub fn connect(addr: SocketAddr, retry: Duration) -> Self {
        let (tx, rx) = mpsc::channel(INBOX_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(read_loop(addr, retry, tx, cancel.clone()));
        Self { rx, cancel }
    }

    /// Next raw line; `None` once the subscriber is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next line decoded as `T`.
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Option<Result<T, BusError>> {
        let line = self.recv().await?;
        Some(serde_json::from_str(&line).map_err(BusError::from))
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    addr: SocketAddr,
    retry: Duration,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            s = TcpStream::connect(addr) => s,
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::trace!(addr = %addr, error = %e, "bus publisher not reachable yet");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(retry) => continue,
                }
            }
        };
        tracing::debug!(addr = %addr, "bus subscriber connected");

        let mut reader = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                n = reader.next() => n,
            };
            match next {
                Some(Ok(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(addr = %addr, "bus line too long, skipped");
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    tracing::debug!(addr = %addr, error = %e, "bus read failed");
                    break;
                }
                None => break,
            }
        }

        tracing::debug!(addr = %addr, "bus publisher went away, reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry) => {}
        }
    }
}
