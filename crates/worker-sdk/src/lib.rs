//! `sb-worker-sdk`: reusable SDK for building SignalBench worker processes.
//!
//! A "worker" is a process that serves one bridged namespace. The gateway
//! launches it (or an operator starts it by hand), hands it the bridge's
//! publish address, and from then on forwards every browser session of that
//! namespace over the bus. This crate provides the handshake, the session
//! map and the dispatch loop so worker authors only write a [`SignalTable`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your worker                                              │
//! │                                                           │
//! │   let mut table = SignalTable::new();                     │
//! │   table.on("ping", Signature::none(), |s, _| async move { │
//! │       s.emit("pong", &json!({})).await?;                  │
//! │       Ok(())                                              │
//! │   });                                                     │
//! │                                                           │
//! │   WorkerClientBuilder::from_env()                         │
//! │       .build()?                                           │
//! │       .run(table, shutdown)                               │
//! │       .await;                                             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Bridge flow (hard-coded by the SDK)
//!
//! 1. Subscribe to the bridge address (`SIGNALBENCH_BRIDGE`), retrying
//! 2. On `{namespace, publish_on_port}`: bind the publisher on that port
//!    (first time only), then answer `{namespace, ready: true}`
//! 3. On an envelope for this namespace:
//!    - `__connect`: create the session, store the worker's CLI args under
//!      `cli_args`, run the connect hook
//!    - `__disconnect`: run the disconnect hook, cancel and forget the session
//!    - any other signal: dispatch on a task, same as the gateway does locally
//! 4. Session emits go back to the bridge as envelopes, datastore changes as
//!    `__data {key: value}`

pub mod builder;
pub mod client;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::WorkerClientBuilder;
pub use client::{WorkerClient, CLI_ARGS_KEY};
pub use types::WorkerSdkError;

// Re-export sb-analysis so workers never need to import it directly.
pub use sb_analysis::{
    Args, HandlerError, HandlerResult, Session, SignalHandler, SignalTable, Signature,
};
pub use sb_protocol::{BRIDGE_ENV, NAMESPACE_ENV};
