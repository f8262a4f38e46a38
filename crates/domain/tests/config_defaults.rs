use sb_domain::config::{Config, ConfigSeverity};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert!(config.namespaces.is_empty());
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config
        .server
        .cors
        .allowed_origins
        .contains(&"http://localhost:*".to_string()));
    assert!(config
        .server
        .cors
        .allowed_origins
        .contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn full_config_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 5001

[observability]
log_format = "compact"

[[namespaces]]
name = "dummypi"
description = "Monte Carlo pi"

[namespaces.bridge]
command = "sb-hello-worker"
handshake_timeout_ms = 2000

[[namespaces]]
name = "external"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 5001);
    assert_eq!(config.namespaces.len(), 2);
    assert_eq!(config.namespaces[0].bridge.handshake_timeout_ms, 2000);
    assert!(config.namespaces[1].bridge.command.is_none());
    assert!(config.validate().is_empty());
}

#[test]
fn empty_host_fails_validation() {
    let toml_str = r#"
[server]
host = ""
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.host"));
}
