//! Logging listener for message observation.

use kafka_processor_core::{BoxError, DispatchContext, Listener};

/// A listener that logs each message it sees.
///
/// Registered under [`EventKey::End`] it reports the processing duration;
/// anywhere else it logs the message coordinates at debug level.
///
/// [`EventKey::End`]: kafka_processor_core::EventKey::End
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl Listener for LoggingListener {
    async fn on_message(&self, ctx: &DispatchContext) -> Result<(), BoxError> {
        let kafka = ctx.kafka();
        let event = ctx.event().map(|e| e.as_str()).unwrap_or("<none>");
        match ctx.metadata() {
            Some(metadata) => tracing::info!(
                topic = %kafka.topic,
                partition = kafka.partition,
                offset = kafka.message.offset,
                event,
                duration_ms = metadata.processing_duration.as_millis() as u64,
                "processed message"
            ),
            None => tracing::debug!(
                topic = %kafka.topic,
                partition = kafka.partition,
                offset = kafka.message.offset,
                event,
                "received message"
            ),
        }
        Ok(())
    }
}
