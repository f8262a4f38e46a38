//! In-memory registry of live sessions within one namespace.

use std::collections::HashMap;

use parking_lot::RwLock;
use sb_analysis::{generate_session_id, RequestArgs, Session};

/// Outcome of [`SessionRegistry::connect`].
pub struct Connected {
    pub session: Session,
    /// The session previously holding the requested id, already closed.
    pub evicted: Option<Session>,
}

/// Thread-safe map of session id → live session.
///
/// At most one live session per id. Removal is by identity, so a connection
/// whose id was taken over never removes its successor.
pub struct SessionRegistry {
    namespace: String,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a session.
    ///
    /// Without a requested id a fresh one is generated, regenerating on
    /// collision. A requested id that is already live is taken over: the
    /// previous session is closed and returned as `evicted`.
    pub fn connect(&self, requested: Option<String>, request_args: RequestArgs) -> Connected {
        let mut sessions = self.sessions.write();

        let id = match requested {
            Some(id) => id,
            None => loop {
                let candidate = generate_session_id();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let session = Session::new(id.clone(), self.namespace.clone(), request_args);
        let evicted = sessions.insert(id.clone(), session.clone());
        drop(sessions);

        if let Some(previous) = &evicted {
            previous.close();
            tracing::info!(
                namespace = %self.namespace,
                session_id = %id,
                "session id taken over, previous session closed"
            );
        }
        tracing::debug!(namespace = %self.namespace, session_id = %id, "session registered");

        Connected { session, evicted }
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove `session` if it is still the live holder of its id.
    pub fn remove(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(session.id()) {
            Some(live) if live.same_as(session) => {
                sessions.remove(session.id());
                tracing::debug!(
                    namespace = %self.namespace,
                    session_id = %session.id(),
                    "session removed"
                );
                true
            }
            _ => false,
        }
    }

    /// Close and forget every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        drained.len()
    }

    /// All live session ids (sorted).
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
