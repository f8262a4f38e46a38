mod namespace;
mod observability;
mod server;

pub use namespace::*;
pub use observability::*;
pub use server::*;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Namespaces served by external worker processes.
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.max_frame_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.max_frame_bytes".into(),
                message: "max_frame_bytes must be greater than 0".into(),
            });
        }

        if self.server.outbound_buffer == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.outbound_buffer".into(),
                message: "outbound_buffer must be greater than 0".into(),
            });
        }

        // CORS: warn if wildcard is used.
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, ns) in self.namespaces.iter().enumerate() {
            if !is_valid_namespace_name(&ns.name) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("namespaces[{i}].name"),
                    message: format!(
                        "\"{}\" is not a valid namespace name (letters, digits, '_' and '-')",
                        ns.name
                    ),
                });
            }
            if !seen.insert(ns.name.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("namespaces[{i}].name"),
                    message: format!("duplicate namespace \"{}\"", ns.name),
                });
            }
            if self.server.builtin_echo && ns.name == BUILTIN_ECHO_NAMESPACE {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("namespaces[{i}].name"),
                    message: format!(
                        "\"{BUILTIN_ECHO_NAMESPACE}\" is reserved while server.builtin_echo is on"
                    ),
                });
            }
            errors.extend(ns.bridge.validate(&format!("namespaces[{i}].bridge")));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn duplicate_and_invalid_names_are_errors() {
        let toml_str = r#"
            [[namespaces]]
            name = "dup"
            [namespaces.bridge]
            command = "worker"

            [[namespaces]]
            name = "dup"
            [namespaces.bridge]
            command = "worker"

            [[namespaces]]
            name = "has space"
            [namespaces.bridge]
            command = "worker"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        let issues = cfg.validate();
        assert_eq!(
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count(),
            2
        );
        assert!(issues.iter().any(|i| i.message.contains("duplicate")));
        assert!(issues.iter().any(|i| i.message.contains("has space")));
    }

    #[test]
    fn echo_name_reserved_only_with_builtin() {
        let toml_str = r#"
            [[namespaces]]
            name = "echo"
            [namespaces.bridge]
            command = "worker"
        "#;
        let mut cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.validate().len(), 1);

        cfg.server.builtin_echo = false;
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn wildcard_cors_is_a_warning() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
        assert!(issues[0].to_string().starts_with("[WARN]"));
    }
}
