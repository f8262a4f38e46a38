//! Reference "hello-world" worker for SignalBench.
//!
//! Serves one bridged namespace with three signals:
//!
//! - `ping`: reply `pong` with a timestamp
//! - `echo`: reply `echo` with the given message
//! - `whoami`: reply with the `user` query argument captured at connect
//!
//! Usage (normally launched by the gateway, which sets both env vars):
//!   SIGNALBENCH_BRIDGE=127.0.0.1:5601 SIGNALBENCH_NAMESPACE=hello sb-hello-worker
//!
//! A bridge address passed as the first argument overrides the env var.

use chrono::Utc;
use serde_json::json;
use sb_worker_sdk::{Signature, SignalTable, WorkerClientBuilder, WorkerSdkError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut builder = WorkerClientBuilder::from_env();
    if let Some(addr) = std::env::args().nth(1) {
        builder = builder.bridge_addr(addr);
    }
    let client = builder.build()?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    tracing::info!(namespace = %client.namespace(), "hello worker starting");
    match client.run(table(), shutdown).await {
        Ok(()) | Err(WorkerSdkError::Shutdown) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn table() -> SignalTable {
    let mut table = SignalTable::new();
    table
        .on("ping", Signature::none(), |session, _| async move {
            session
                .emit("pong", &json!({ "timestamp": Utc::now().timestamp_millis() }))
                .await?;
            Ok(())
        })
        .on("echo", Signature::new(["message"]), |session, args| async move {
            let message = args.get("message").cloned().unwrap_or_default();
            session.emit("echo", &json!({ "message": message })).await?;
            Ok(())
        })
        .on("whoami", Signature::none(), |session, _| async move {
            let user = session.data().get("user").unwrap_or_default();
            session.emit("whoami", &json!({ "user": user })).await?;
            Ok(())
        })
        .on_connect(|session| async move {
            let user = session.request_arg("user").unwrap_or("anonymous").to_owned();
            session.data().set("user", &user)?;
            tracing::info!(session_id = %session.id(), user = %user, "hello session started");
            Ok(())
        })
        .on_disconnect(|session| async move {
            tracing::info!(session_id = %session.id(), "hello session ended");
            Ok(())
        });
    table
}
