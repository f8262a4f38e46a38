//! Worker process launcher and exit monitor.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Weak;

use sb_domain::config::BridgeConfig;
use sb_protocol::{BRIDGE_ENV, NAMESPACE_ENV};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bridge::{Bridge, BridgeError};

/// Spawn the configured worker command.
///
/// The worker only learns the bridge's publish address and its namespace;
/// everything else comes over the bus. The child is killed when its handle
/// is dropped.
pub fn launch(
    namespace: &str,
    config: &BridgeConfig,
    command: &str,
    bridge_addr: SocketAddr,
) -> Result<Child, BridgeError> {
    let mut cmd = Command::new(command);
    cmd.args(&config.args)
        .envs(&config.env)
        .env(BRIDGE_ENV, bridge_addr.to_string())
        .env(NAMESPACE_ENV, namespace)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| BridgeError::Spawn {
        command: command.to_owned(),
        source,
    })?;

    tracing::info!(
        namespace = %namespace,
        command = %command,
        pid = child.id().unwrap_or_default(),
        bridge = %bridge_addr,
        "worker process launched"
    );
    Ok(child)
}

/// Watch a launched worker until it exits or `shutdown` fires.
///
/// An exit before shutdown is a worker failure: the bridge is marked failed,
/// which closes every live session of the namespace.
pub fn monitor(
    mut child: Child,
    bridge: Weak<Bridge>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                let status = match status {
                    Ok(s) => s.to_string(),
                    Err(e) => format!("wait failed: {e}"),
                };
                if let Some(bridge) = bridge.upgrade() {
                    bridge.fail(&status);
                }
            }
            _ = shutdown.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "worker kill on shutdown failed");
                }
            }
        }
    })
}
