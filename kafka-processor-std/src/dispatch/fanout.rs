//! Concurrent fan-out of one phase.
//!
//! All listeners of a phase are started together and awaited as a group.
//! A failing (or panicking) listener does not cut the others short; the
//! phase only reports failure once every listener has settled.

use futures::{FutureExt, future::join_all};
use kafka_processor_core::{
    BoxError, DispatchContext, EventKey, HandlerError, ListenerHandle, ListenerPanic, Phase,
};
use std::{any::Any, panic::AssertUnwindSafe};

/// Run every listener in `listeners` concurrently and wait for all of them.
///
/// Returns the number of listeners invoked.
pub async fn run_phase(
    phase: Phase,
    key: &EventKey,
    listeners: &[ListenerHandle],
    ctx: &DispatchContext,
) -> Result<usize, HandlerError> {
    if listeners.is_empty() {
        return Ok(0);
    }

    let results = join_all(
        listeners
            .iter()
            .map(|l| AssertUnwindSafe(l.call(ctx)).catch_unwind()),
    )
    .await;

    let total = results.len();
    let failures: Vec<BoxError> = results
        .into_iter()
        .filter_map(|result| match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(Box::new(ListenerPanic(panic_message(panic))) as BoxError),
        })
        .collect();

    if failures.is_empty() {
        return Ok(total);
    }

    tracing::warn!(
        phase = %phase,
        event = %key,
        failed = failures.len(),
        total,
        first_error = %failures[0],
        "listener failures"
    );
    Err(HandlerError {
        phase,
        event: key.clone(),
        failed: failures.len(),
        total,
        failures,
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
