//! Namespaces: one analysis each, served either in-process or by a worker.

pub mod bridge;
pub mod handshake;
pub mod launcher;
pub mod registry;
pub mod router;
pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use sb_analysis::SignalTable;
use sb_domain::config::NamespaceConfig;
use serde::Serialize;

use self::bridge::{Bridge, BridgeError};
use self::registry::SessionRegistry;

/// Where a namespace's handlers run.
pub enum Backend {
    /// Dispatched in the gateway process.
    Local(Arc<SignalTable>),
    /// Forwarded to a worker process over the bus.
    Bridged(Arc<Bridge>),
}

pub struct Namespace {
    name: String,
    description: String,
    backend: Backend,
    sessions: Arc<SessionRegistry>,
}

/// Summary returned by `GET /v1/namespaces`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub description: String,
    pub bridged: bool,
    pub failed: bool,
    pub sessions: usize,
}

impl Namespace {
    pub fn local(name: impl Into<String>, description: impl Into<String>, table: SignalTable) -> Self {
        let name = name.into();
        Self {
            sessions: Arc::new(SessionRegistry::new(name.clone())),
            name,
            description: description.into(),
            backend: Backend::Local(Arc::new(table)),
        }
    }

    /// Start the bridge for a configured namespace. Completes only after the
    /// worker handshake.
    pub async fn bridged(config: &NamespaceConfig) -> Result<Self, BridgeError> {
        let sessions = Arc::new(SessionRegistry::new(config.name.clone()));
        let bridge = Bridge::start(config, sessions.clone()).await?;
        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            backend: Backend::Bridged(bridge),
            sessions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// A bridged namespace whose worker died accepts no new sessions.
    pub fn is_failed(&self) -> bool {
        match &self.backend {
            Backend::Local(_) => false,
            Backend::Bridged(bridge) => bridge.is_failed(),
        }
    }

    pub fn info(&self) -> NamespaceInfo {
        NamespaceInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            bridged: matches!(self.backend, Backend::Bridged(_)),
            failed: self.is_failed(),
            sessions: self.sessions.len(),
        }
    }

    /// Close every session and stop the bridge, if any.
    pub fn shutdown(&self) {
        let closed = self.sessions.close_all();
        if let Backend::Bridged(bridge) = &self.backend {
            bridge.shutdown();
        }
        tracing::debug!(namespace = %self.name, sessions_closed = closed, "namespace shut down");
    }
}

/// All namespaces served by this gateway. Built once at startup.
#[derive(Default)]
pub struct NamespaceRegistry {
    namespaces: HashMap<String, Arc<Namespace>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: Namespace) -> sb_domain::Result<()> {
        if self.namespaces.contains_key(namespace.name()) {
            return Err(sb_domain::Error::Config(format!(
                "namespace '{}' registered twice",
                namespace.name()
            )));
        }
        tracing::info!(
            namespace = %namespace.name(),
            bridged = matches!(namespace.backend(), Backend::Bridged(_)),
            "namespace registered"
        );
        self.namespaces
            .insert(namespace.name().to_owned(), Arc::new(namespace));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).cloned()
    }

    /// Summaries of every namespace (sorted by name).
    pub fn list(&self) -> Vec<NamespaceInfo> {
        let mut infos: Vec<NamespaceInfo> = self.namespaces.values().map(|n| n.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn shutdown(&self) {
        for namespace in self.namespaces.values() {
            namespace.shutdown();
        }
    }
}
