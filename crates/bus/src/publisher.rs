//! Publishing side of the bus.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::SinkExt;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::{BusError, MAX_LINE_BYTES};

const FANOUT_BUFFER: usize = 1024;

/// Bound publisher. Dropping it stops the accept loop and disconnects every
/// subscriber.
pub struct Publisher {
    tx: broadcast::Sender<Arc<str>>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl Publisher {
    pub async fn bind(addr: SocketAddr) -> Result<Self, BusError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, _) = broadcast::channel(FANOUT_BUFFER);
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(listener, tx.clone(), cancel.clone()));
        tracing::debug!(addr = %local_addr, "bus publisher bound");

        Ok(Self {
            tx,
            local_addr,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serialize and fan out one message. Returns the number of subscribers
    /// it was queued for; zero means it was dropped.
    pub fn publish<T: Serialize + ?Sized>(&self, message: &T) -> Result<usize, BusError> {
        let line = serde_json::to_string(message)?;
        Ok(self.tx.send(Arc::from(line)).unwrap_or(0))
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Arc<str>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "bus subscriber connected");
                    let rx = tx.subscribe();
                    tokio::spawn(serve_subscriber(stream, peer, rx, cancel.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "bus accept failed");
                }
            },
        }
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Arc<str>>,
    cancel: CancellationToken,
) {
    let (mut read, write) = stream.into_split();
    let mut writer = FramedWrite::new(write, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut scratch = [0u8; 64];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            // Subscribers never write; EOF or an error means they left.
            n = read.read(&mut scratch) => {
                if matches!(n, Ok(0) | Err(_)) {
                    break;
                }
            }
            received = rx.recv() => match received {
                Ok(line) => {
                    if let Err(e) = writer.send(&*line).await {
                        tracing::debug!(peer = %peer, error = %e, "bus subscriber write failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(peer = %peer, skipped = n, "bus subscriber lagged, skipped messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!(peer = %peer, "bus subscriber disconnected");
}
