use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Namespaces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A namespace backed by an external worker process.
///
/// ```toml
/// [[namespaces]]
/// name = "dummypi"
/// description = "Monte Carlo estimate of pi"
///
/// [namespaces.bridge]
/// command = "sb-hello-worker"
/// handshake_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Routing prefix; the WebSocket endpoint is `/{name}/ws`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Process bridge settings for one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Worker executable. When `None` the worker is expected to be started
    /// separately and pointed at the bridge's publish address.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the worker process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Host the bridge publishes on (the worker subscribes here).
    #[serde(default = "d_publish_host")]
    pub publish_host: String,
    /// Port the bridge publishes on. `0` picks an ephemeral port.
    #[serde(default)]
    pub publish_port: u16,
    /// Port the worker publishes on. When unset, an ephemeral port is
    /// reserved at startup and sent to the worker in the init message.
    #[serde(default)]
    pub subscribe_port: Option<u16>,
    /// How often the init message is re-published until the worker answers.
    #[serde(default = "d_handshake_interval_ms")]
    pub handshake_interval_ms: u64,
    /// Give up on the worker after this long. `0` retries forever.
    #[serde(default = "d_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            publish_host: d_publish_host(),
            publish_port: 0,
            subscribe_port: None,
            handshake_interval_ms: d_handshake_interval_ms(),
            handshake_timeout_ms: d_handshake_timeout_ms(),
        }
    }
}

impl BridgeConfig {
    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }

    /// `None` when the handshake is allowed to retry forever.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_ms > 0).then(|| Duration::from_millis(self.handshake_timeout_ms))
    }

    pub(super) fn validate(&self, field: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if matches!(self.command.as_deref(), Some(c) if c.trim().is_empty()) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{field}.command"),
                message: "command must not be empty (omit it for an external worker)".into(),
            });
        }
        if self.handshake_interval_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{field}.handshake_interval_ms"),
                message: "handshake_interval_ms must be greater than 0".into(),
            });
        }
        if self.handshake_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: format!("{field}.handshake_timeout_ms"),
                message: "0 disables the handshake timeout; startup waits forever for the worker"
                    .into(),
            });
        }
        if self.publish_port != 0 && self.subscribe_port == Some(self.publish_port) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{field}.subscribe_port"),
                message: "subscribe_port must differ from publish_port".into(),
            });
        }
        errors
    }
}

/// Namespace names double as URL path segments.
pub fn is_valid_namespace_name(name: &str) -> bool {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"))
        .is_match(name)
}

// ── serde default helpers ───────────────────────────────────────────

fn d_publish_host() -> String {
    "127.0.0.1".into()
}
fn d_handshake_interval_ms() -> u64 {
    100
}
fn d_handshake_timeout_ms() -> u64 {
    10_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
