//! Signal dispatch: lookup → classify → correlate → bind → call.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use sb_protocol::Payload;

use crate::action::run_action;
use crate::session::Session;
use crate::table::SignalTable;
use crate::types::{DispatchError, HandlerError};

/// Dispatch one signal and wait for the handler to finish.
///
/// `payload` is `None` when the frame carried no payload at all, which binds
/// zero arguments. Unknown signals return before any `__action` is emitted.
pub async fn dispatch(
    table: &SignalTable,
    session: &Session,
    signal: &str,
    payload: Option<Value>,
) -> Result<(), DispatchError> {
    let handler = table
        .get(signal)
        .ok_or_else(|| DispatchError::UnknownSignal(signal.to_owned()))?;

    let mut payload = Payload::classify(payload);
    let action_id = payload.take_action_id();

    tracing::debug!(
        session_id = %session.id(),
        namespace = %session.namespace(),
        signal = %signal,
        payload_kind = payload.kind(),
        action_id = action_id.as_deref().unwrap_or(""),
        "dispatching signal"
    );

    run_action(session, action_id.as_deref(), async {
        let args = handler.signature().bind(payload)?;
        handler.call(session.clone(), args).await
    })
    .await?;
    Ok(())
}

/// Dispatch on a new task so the caller's read loop keeps going.
///
/// The lookup happens before spawning: an unknown signal is returned to the
/// caller and nothing runs. Handler outcomes are logged, never propagated.
pub fn spawn_dispatch(
    table: &Arc<SignalTable>,
    session: &Session,
    signal: String,
    payload: Value,
) -> Result<JoinHandle<()>, DispatchError> {
    if table.get(&signal).is_none() {
        return Err(DispatchError::UnknownSignal(signal));
    }

    let table = table.clone();
    let session = session.clone();
    Ok(tokio::spawn(async move {
        match dispatch(&table, &session, &signal, Some(payload)).await {
            Ok(()) => {}
            Err(DispatchError::Handler(HandlerError::Cancelled)) => {
                tracing::debug!(
                    session_id = %session.id(),
                    signal = %signal,
                    "handler cancelled with its session"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    namespace = %session.namespace(),
                    signal = %signal,
                    error = %e,
                    "signal handler failed"
                );
            }
        }
    }))
}
