use std::sync::Arc;

use chrono::{DateTime, Utc};
use sb_domain::config::Config;

use crate::namespaces::NamespaceRegistry;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Every namespace this gateway serves, local and bridged.
    pub namespaces: Arc<NamespaceRegistry>,
    pub started_at: DateTime<Utc>,
}
