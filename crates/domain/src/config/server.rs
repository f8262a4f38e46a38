use serde::{Deserialize, Serialize};

/// Name of the built-in local echo analysis.
pub const BUILTIN_ECHO_NAMESPACE: &str = "echo";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_5000")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Inbound WebSocket frames larger than this are dropped.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "d_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Register the built-in `echo` analysis.
    #[serde(default = "d_true")]
    pub builtin_echo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "127.0.0.1".into(),
            cors: CorsConfig::default(),
            max_frame_bytes: d_max_frame_bytes(),
            outbound_buffer: d_outbound_buffer(),
            builtin_echo: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_5000() -> u16 {
    5000
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_max_frame_bytes() -> usize {
    1024 * 1024
}
fn d_outbound_buffer() -> usize {
    256
}
fn d_true() -> bool {
    true
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.max_frame_bytes, 1024 * 1024);
        assert!(cfg.builtin_echo);
    }

    #[test]
    fn server_config_parses_partial_table() {
        let toml_str = r#"
            port = 8080
            host = "0.0.0.0"
            builtin_echo = false
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(!cfg.builtin_echo);
        assert_eq!(cfg.outbound_buffer, 256);
    }
}
