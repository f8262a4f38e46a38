//! AppState construction extracted from `main.rs`.
//!
//! Integration tests boot the gateway through the same path, so everything
//! `serve` needs besides the listener lives here.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use chrono::Utc;

use sb_domain::config::{Config, ConfigSeverity};

use crate::api;
use crate::builtin;
use crate::namespaces::{Namespace, NamespaceRegistry};
use crate::state::AppState;

/// Validate config, start every namespace and return a fully-wired
/// [`AppState`].
///
/// Bridged namespaces are started one after another; each waits for its
/// worker's handshake. A failed handshake aborts startup.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    let mut namespaces = NamespaceRegistry::new();

    // ── Built-in analyses ────────────────────────────────────────────
    if config.server.builtin_echo {
        namespaces
            .insert(builtin::echo_namespace())
            .context("registering built-in echo analysis")?;
    }

    // ── Bridged namespaces ───────────────────────────────────────────
    for ns in &config.namespaces {
        let namespace = match Namespace::bridged(ns)
            .await
            .with_context(|| format!("starting bridge for namespace '{}'", ns.name))
        {
            Ok(n) => n,
            Err(e) => {
                // Bridges already started would otherwise keep their
                // workers alive until drop.
                namespaces.shutdown();
                return Err(e);
            }
        };
        namespaces.insert(namespace)?;
    }

    if namespaces.is_empty() {
        tracing::warn!("no namespaces configured, every websocket will get 404");
    } else {
        tracing::info!(namespaces = namespaces.len(), "namespace registry ready");
    }

    Ok(AppState {
        config,
        namespaces: Arc::new(namespaces),
        started_at: Utc::now(),
    })
}

/// The application router with its state attached, without outer layers.
pub fn app(state: AppState) -> Router {
    api::router().with_state(state)
}
