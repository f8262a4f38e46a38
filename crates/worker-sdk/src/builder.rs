//! Builder pattern for constructing a [`WorkerClient`].

use std::time::Duration;

use crate::client::WorkerClient;
use crate::types::WorkerSdkError;
use crate::{BRIDGE_ENV, NAMESPACE_ENV};

/// Fluent builder for [`WorkerClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use sb_worker_sdk::WorkerClientBuilder;
/// let client = WorkerClientBuilder::new()
///     .bridge_addr("127.0.0.1:5601")
///     .namespace("dummypi")
///     .retry_interval(std::time::Duration::from_millis(50))
///     .build()
///     .unwrap();
/// ```
pub struct WorkerClientBuilder {
    pub(crate) bridge_addr: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) publish_host: String,
    pub(crate) retry_interval: Duration,
    pub(crate) cli_args: Vec<String>,
}

impl WorkerClientBuilder {
    pub fn new() -> Self {
        Self {
            bridge_addr: None,
            namespace: None,
            publish_host: "127.0.0.1".into(),
            retry_interval: Duration::from_millis(100),
            cli_args: Vec::new(),
        }
    }

    /// Seed bridge address and namespace from `SIGNALBENCH_BRIDGE` and
    /// `SIGNALBENCH_NAMESPACE`, as set by the gateway's launcher, and the CLI
    /// args from the process's own arguments.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        builder.cli_args = std::env::args().skip(1).collect();
        builder.bridge_addr = std::env::var(BRIDGE_ENV).ok().filter(|s| !s.is_empty());
        builder.namespace = std::env::var(NAMESPACE_ENV).ok().filter(|s| !s.is_empty());
        builder
    }

    // ── Required ─────────────────────────────────────────────────────

    /// The bridge's publish address (`host:port`).
    pub fn bridge_addr(mut self, addr: impl Into<String>) -> Self {
        self.bridge_addr = Some(addr.into());
        self
    }

    /// The namespace to serve; messages for other namespaces are ignored.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Interface the worker's publisher binds on (default `127.0.0.1`).
    pub fn publish_host(mut self, host: impl Into<String>) -> Self {
        self.publish_host = host.into();
        self
    }

    /// How often to retry reaching the bridge (default 100ms).
    pub fn retry_interval(mut self, d: Duration) -> Self {
        self.retry_interval = d;
        self
    }

    /// Arguments every session finds in its datastore under `cli_args`.
    pub fn cli_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cli_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<WorkerClient, WorkerSdkError> {
        let bridge_addr = self
            .bridge_addr
            .ok_or_else(|| WorkerSdkError::Config(format!("bridge address is required ({BRIDGE_ENV})")))?;
        let namespace = self
            .namespace
            .ok_or_else(|| WorkerSdkError::Config(format!("namespace is required ({NAMESPACE_ENV})")))?;
        let (host, port) = split_host_port(&bridge_addr)?;

        Ok(WorkerClient {
            bridge_host: host,
            bridge_port: port,
            namespace,
            publish_host: self.publish_host,
            retry_interval: self.retry_interval,
            cli_args: self.cli_args,
        })
    }
}

impl Default for WorkerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16), WorkerSdkError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| WorkerSdkError::Config(format!("bridge address '{addr}' is not host:port")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| WorkerSdkError::Config(format!("bridge address '{addr}' has an invalid port")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(WorkerSdkError::Config(format!("bridge address '{addr}' has no host")));
    }
    Ok((host.to_owned(), port))
}
