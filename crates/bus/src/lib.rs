//! `sb-bus`: one-directional publish/subscribe over TCP.
//!
//! A [`Publisher`] binds a port and fans every published message out to all
//! currently connected subscribers. A [`Subscriber`] connects to a publisher,
//! retrying until it is reachable and reconnecting if it goes away.
//!
//! Messages are JSON, one per line. A message published while no subscriber
//! is connected is dropped; callers that need delivery must handshake first.
//!
//! ```text
//!   gateway bridge                         worker process
//!  ┌───────────────┐  envelopes / init   ┌───────────────┐
//!  │   Publisher   │ ──────────────────▶ │  Subscriber   │
//!  │  Subscriber   │ ◀────────────────── │   Publisher   │
//!  └───────────────┘  envelopes / ready  └───────────────┘
//! ```

pub mod publisher;
pub mod subscriber;

use std::net::SocketAddr;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Longest accepted line; longer lines are skipped by the reader.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("address {0} did not resolve")]
    Unresolved(String),
}

/// Find a free TCP port on `host` by binding and immediately releasing it.
pub fn reserve_port(host: &str) -> Result<u16, BusError> {
    let listener = std::net::TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Resolve `host:port` to the first socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, BusError> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| BusError::Unresolved(format!("{host}:{port}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_port_returns_nonzero() {
        assert_ne!(reserve_port("127.0.0.1").unwrap(), 0);
    }

    #[test]
    fn resolve_localhost() {
        let addr = resolve("127.0.0.1", 4000).unwrap();
        assert_eq!(addr.port(), 4000);
        assert!(addr.ip().is_loopback());
    }
}
