//! Time-limited listener wrapper.
//!
//! **Note**: This module requires the `tokio` runtime (`timeout` feature).

use kafka_processor_core::{BoxError, DispatchContext, Listener};
use std::time::Duration;

/// A listener that fails if the wrapped listener does not finish in time.
///
/// The wrapped future is dropped on expiry, so a timed-out listener stops
/// running; the phase then reports a [`TimeoutError`].
///
/// # Example
///
/// ```rust,ignore
/// // Give the audit writer at most 500ms per message
/// registry.register(EventKey::End, Timeout::millis(AuditWriter::new(), 500));
/// ```
pub struct Timeout<L> {
    inner: L,
    duration: Duration,
}

impl<L> Timeout<L> {
    /// Wrap `inner` with a time limit.
    pub fn new(inner: L, duration: Duration) -> Self {
        Self { inner, duration }
    }

    /// Time limit in seconds.
    pub fn secs(inner: L, seconds: u64) -> Self {
        Self::new(inner, Duration::from_secs(seconds))
    }

    /// Time limit in milliseconds.
    pub fn millis(inner: L, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    /// The configured time limit.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The wrapped listener.
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

/// The wrapped listener exceeded its time limit.
#[derive(Debug, Clone, thiserror::Error)]
#[error("listener timed out after {duration:?}")]
pub struct TimeoutError {
    duration: Duration,
}

impl TimeoutError {
    /// The limit that was exceeded.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl<L: Listener> Listener for Timeout<L> {
    async fn on_message(&self, ctx: &DispatchContext) -> Result<(), BoxError> {
        match tokio::time::timeout(self.duration, self.inner.on_message(ctx)).await {
            Ok(res) => res,
            Err(_) => Err(Box::new(TimeoutError {
                duration: self.duration,
            }) as BoxError),
        }
    }
}
