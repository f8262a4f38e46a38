//! `sb-analysis`: the analysis side of a SignalBench namespace.
//!
//! An *analysis* is a [`SignalTable`]: a set of named signal handlers plus
//! optional connect/disconnect hooks. Every browser connection gets its own
//! [`Session`], and inbound signals are dispatched to the table's handlers
//! with the session as context. The same table and the same dispatch path
//! run inside the gateway (local namespaces) and inside worker processes
//! (bridged namespaces).
//!
//! # Example
//!
//! ```rust,no_run
//! use sb_analysis::{Signature, SignalTable};
//! use serde_json::json;
//!
//! let mut table = SignalTable::new();
//! table.on("run", Signature::new(["my_param"]), |session, args| async move {
//!     let p: String = args.value("my_param")?;
//!     session.emit("result", &json!({ "result": format!("done:{p}") })).await?;
//!     Ok(())
//! });
//! ```
//!
//! # Dispatch path
//!
//! 1. Look the signal up in the table (miss → [`DispatchError::UnknownSignal`])
//! 2. Classify the payload and strip the reserved `__action_id`
//! 3. Action correlator: emit `__action start`, run, emit `__action end`
//! 4. Inside the bracket: bind the payload to the handler's [`Signature`],
//!    then call the handler
//!
//! Each dispatched call is a task tied to its session's cancellation token,
//! so closing a session cancels every handler still running for it.

pub mod action;
pub mod datastore;
pub mod dispatch;
pub mod session;
pub mod signature;
pub mod table;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use action::run_action;
pub use datastore::Datastore;
pub use dispatch::{dispatch, spawn_dispatch};
pub use session::{generate_session_id, Emit, RequestArgs, Session, TransportClosed, TryEmitError};
pub use signature::{Args, Signature};
pub use table::{SignalHandler, SignalTable};
pub use types::{ArgumentError, DispatchError, HandlerError, HandlerResult};

pub use sb_protocol::{Payload, SignalMessage};
