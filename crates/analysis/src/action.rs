//! Action correlator.
//!
//! When an inbound signal carried an `__action_id`, the handler call is
//! bracketed by `__action {id, status: "start"}` and
//! `__action {id, status: "end"}` on the same session. The end message is
//! emitted however the call finishes: success, error, panic or session
//! cancellation.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use sb_protocol::{ActionStatus, SignalMessage};

use crate::session::Session;
use crate::types::{HandlerError, HandlerResult};

pub async fn run_action<F>(session: &Session, action_id: Option<&str>, invocation: F) -> HandlerResult
where
    F: Future<Output = HandlerResult> + Send,
{
    if let Some(id) = action_id {
        session
            .emit_message(SignalMessage::action(id, ActionStatus::Start))
            .await;
    }

    let cancel = session.cancel_token().clone();
    let result = tokio::select! {
        outcome = AssertUnwindSafe(invocation).catch_unwind() => {
            outcome.unwrap_or(Err(HandlerError::Panicked))
        }
        _ = cancel.cancelled() => Err(HandlerError::Cancelled),
    };

    if let Some(id) = action_id {
        session
            .emit_message(SignalMessage::action(id, ActionStatus::End))
            .await;
    }

    result
}
