//! The dispatch engine.
//!
//! Turns one [`Envelope`] into listener invocations in three fixed phases:
//!
//! 1. decode the payload and attach broker coordinates
//! 2. run the [`EventKey::Start`] listeners
//! 3. start the clock, run the listeners of the record's event, stop the clock
//! 4. attach [`ProcessingMetadata`] and run the [`EventKey::End`] listeners
//!
//! A failing phase aborts the message; later phases are not entered.

pub mod fanout;

use crate::registry::ListenerRegistry;
use chrono::Utc;
use futures::FutureExt;
use kafka_processor_core::{
    DecodedRecord, DispatchContext, DispatchError, Envelope, EventKey, MessageCallback, Phase,
    ProcessingMetadata,
};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::Instrument;

pub use fanout::run_phase;

/// Field holding the event name unless configured otherwise.
pub const DEFAULT_EVENT_FIELD: &str = "event";

/// What to do with a record that has no event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingEventPolicy {
    /// Run the start and end phases; the event phase has nothing to run.
    #[default]
    Skip,
    /// Fail the dispatch with [`DispatchError::MissingEvent`] before any listener runs.
    Reject,
}

/// Unknown [`MissingEventPolicy`] name.
#[derive(Debug, thiserror::Error)]
#[error("unknown missing-event policy `{0}`, expected `skip` or `reject`")]
pub struct UnknownPolicy(String);

impl FromStr for MissingEventPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(MissingEventPolicy::Skip),
            "reject" => Ok(MissingEventPolicy::Reject),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for MissingEventPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEventPolicy::Skip => f.write_str("skip"),
            MissingEventPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// How records are routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Top-level record field holding the event name.
    pub event_field: String,
    /// Handling of records without that field.
    pub on_missing_event: MissingEventPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            event_field: DEFAULT_EVENT_FIELD.to_string(),
            on_missing_event: MissingEventPolicy::default(),
        }
    }
}

/// Routes messages through the three phases using a [`ListenerRegistry`].
///
/// The dispatcher holds no per-message state; it can serve concurrent
/// dispatches for different partitions.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ListenerRegistry,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Create a dispatcher with default options.
    pub fn new(registry: ListenerRegistry) -> Self {
        Self::with_options(registry, DispatchOptions::default())
    }

    /// Create a dispatcher with explicit options.
    pub fn with_options(registry: ListenerRegistry, options: DispatchOptions) -> Self {
        Self { registry, options }
    }

    /// The registry consulted for each phase.
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// The routing options.
    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Run the full pipeline for one message.
    ///
    /// Returns the timing metadata handed to the end phase.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<ProcessingMetadata, DispatchError> {
        let span = tracing::debug_span!(
            "dispatch",
            topic = %envelope.topic,
            partition = envelope.partition,
            offset = envelope.offset,
        );
        self.dispatch_inner(envelope).instrument(span).await
    }

    /// Wrap the dispatcher as a broker message callback.
    pub fn into_callback(self: Arc<Self>) -> MessageCallback {
        Arc::new(move |envelope: Envelope| {
            let dispatcher = self.clone();
            async move { dispatcher.dispatch(envelope).await.map(|_| ()) }.boxed()
        })
    }

    async fn dispatch_inner(
        &self,
        envelope: Envelope,
    ) -> Result<ProcessingMetadata, DispatchError> {
        let field = self.options.event_field.as_str();
        let record = DecodedRecord::decode(envelope.payload.as_deref()).inspect_err(|err| {
            tracing::warn!(error = %err, "failed to decode message");
        })?;
        let event = record.event_name(field)?;
        if event.is_none() && self.options.on_missing_event == MissingEventPolicy::Reject {
            return Err(DispatchError::MissingEvent {
                field: field.to_string(),
            });
        }

        let mut ctx = DispatchContext::new(record, event, envelope);

        let start_listeners = self.registry.handlers_for(&EventKey::Start);
        run_phase(Phase::Start, &EventKey::Start, &start_listeners, &ctx).await?;

        let started = Utc::now();
        let invoked = match ctx.event_key() {
            Some(key) => {
                let listeners = self.registry.handlers_for(&key);
                run_phase(Phase::Event, &key, &listeners, &ctx).await?
            }
            None => {
                tracing::debug!(field, "record has no event, skipping event phase");
                0
            }
        };
        let metadata = ProcessingMetadata::between(started, Utc::now());
        ctx.set_metadata(metadata);

        let end_listeners = self.registry.handlers_for(&EventKey::End);
        run_phase(Phase::End, &EventKey::End, &end_listeners, &ctx).await?;

        tracing::debug!(
            event = ctx.event().map(|e| e.as_str()),
            listeners = invoked,
            duration_ms = metadata.processing_duration.as_millis() as u64,
            "message dispatched"
        );
        Ok(metadata)
    }
}
