//! `rdkafka`-backed broker client.
//!
//! Consumption runs on a tokio task that reads from a [`StreamConsumer`] and
//! awaits the message callback for each message before reading the next.
//! Offsets are stored after a successful dispatch and committed on the
//! interval given to [`BrokerClient::run`].
//!
//! A listener failure holds the partition's committed offset at the failed
//! message: consumption goes on, but nothing past that offset is stored, so
//! the failed message and everything after it is delivered again once the
//! client re-subscribes. Records that can never succeed (undecodable, or
//! rejected for lacking an event) are stepped over.

use bytes::Bytes;
use kafka_processor_core::{
    BrokerClient, BrokerError, DispatchError, Envelope, RunOptions, TopicSpec,
};
use rdkafka::{
    ClientConfig, Message,
    consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};

/// Connection settings for [`KafkaClient`].
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Comma separated bootstrap servers.
    pub hosts: String,
    /// Consumer group id.
    pub group_id: String,
    /// Use TLS to reach the brokers.
    pub tls: bool,
    /// How long `connect` waits for cluster metadata.
    pub metadata_timeout: Duration,
}

impl KafkaSettings {
    /// Settings for `hosts` and `group_id` without TLS.
    pub fn new(hosts: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            hosts: hosts.into(),
            group_id: group_id.into(),
            tls: false,
            metadata_timeout: Duration::from_secs(10),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.hosts)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");

        if self.tls {
            config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        config
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    connected: bool,
    consumer: Option<Arc<StreamConsumer>>,
    running: Option<Running>,
}

/// A [`BrokerClient`] for Kafka.
pub struct KafkaClient {
    settings: KafkaSettings,
    state: Mutex<State>,
}

impl KafkaClient {
    /// Create a client; nothing is contacted until `connect`.
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(State::default()),
        }
    }

    /// The settings this client was built with.
    pub fn settings(&self) -> &KafkaSettings {
        &self.settings
    }
}

impl BrokerClient for KafkaClient {
    async fn connect(&self) -> Result<(), BrokerError> {
        let probe: BaseConsumer = self
            .settings
            .client_config()
            .create()
            .map_err(BrokerError::connection)?;
        let timeout = self.settings.metadata_timeout;
        // Metadata fetches block; keep them off the runtime threads.
        let brokers = tokio::task::spawn_blocking(move || {
            probe
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(BrokerError::connection)?
        .map_err(BrokerError::connection)?;

        tracing::info!(hosts = %self.settings.hosts, brokers, "connected to kafka");
        self.state.lock().await.connected = true;
        Ok(())
    }

    async fn subscribe(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(BrokerError::NotReady("connected"));
        }
        let reset = if spec.from_beginning {
            "earliest"
        } else {
            "latest"
        };
        let consumer: StreamConsumer = self
            .settings
            .client_config()
            .set("auto.offset.reset", reset)
            .create()
            .map_err(BrokerError::subscription)?;
        consumer
            .subscribe(&[spec.topic.as_str()])
            .map_err(BrokerError::subscription)?;

        tracing::info!(topic = %spec.topic, offset_reset = reset, "subscribed");
        state.consumer = Some(Arc::new(consumer));
        Ok(())
    }

    async fn run(&self, options: RunOptions) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.running.is_some() {
            return Err(BrokerError::consumer("consumer is already running"));
        }
        let consumer = state
            .consumer
            .clone()
            .ok_or(BrokerError::NotReady("subscribed"))?;

        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(consume(consumer, options, signal));
        state.running = Some(Running { shutdown, task });
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let running = self.state.lock().await.running.take();
        let Some(running) = running else {
            return Ok(());
        };
        // The loop finishes the message it is on before observing the signal.
        let _ = running.shutdown.send(true);
        running.task.await.map_err(BrokerError::consumer)?;
        tracing::info!("consumer stopped");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.stop().await?;
        let mut state = self.state.lock().await;
        if let Some(consumer) = state.consumer.take() {
            consumer.unsubscribe();
        }
        state.connected = false;
        tracing::info!("disconnected from kafka");
        Ok(())
    }

    async fn pause(&self) -> Result<(), BrokerError> {
        let consumer = self.consumer().await?;
        let assignment = consumer.assignment().map_err(BrokerError::consumer)?;
        consumer.pause(&assignment).map_err(BrokerError::consumer)
    }

    async fn unpause(&self) -> Result<(), BrokerError> {
        let consumer = self.consumer().await?;
        let assignment = consumer.assignment().map_err(BrokerError::consumer)?;
        consumer.resume(&assignment).map_err(BrokerError::consumer)
    }
}

impl KafkaClient {
    async fn consumer(&self) -> Result<Arc<StreamConsumer>, BrokerError> {
        self.state
            .lock()
            .await
            .consumer
            .clone()
            .ok_or(BrokerError::NotReady("subscribed"))
    }
}

/// First delay after a failed receive.
const RECEIVE_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Upper bound for the receive backoff.
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(5);

enum Step {
    Shutdown,
    Commit,
    Message(Envelope),
    Failed(KafkaError),
}

async fn consume(
    consumer: Arc<StreamConsumer>,
    options: RunOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut commit = tokio::time::interval(options.commit_interval);
    let mut offsets = OffsetTracker::default();
    let mut receive_failures: u32 = 0;
    loop {
        let step = tokio::select! {
            _ = shutdown.changed() => Step::Shutdown,
            _ = commit.tick() => Step::Commit,
            received = consumer.recv() => match received {
                Ok(message) => Step::Message(envelope(&message)),
                Err(err) => Step::Failed(err),
            },
        };

        match step {
            Step::Shutdown => break,
            Step::Commit => {
                // Fails with NoOffset when nothing was stored since the last commit.
                if let Err(err) = consumer.commit_consumer_state(CommitMode::Async) {
                    tracing::debug!(error = %err, "offset commit skipped");
                }
            }
            Step::Failed(err) => {
                receive_failures = receive_failures.saturating_add(1);
                let delay = receive_backoff(receive_failures);
                if receive_failures == 1 {
                    tracing::error!(error = %err, "kafka receive error");
                } else {
                    tracing::debug!(
                        error = %err,
                        failures = receive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "kafka receive still failing"
                    );
                }
                let stopped = tokio::select! {
                    _ = shutdown.changed() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if stopped {
                    break;
                }
            }
            Step::Message(envelope) => {
                if receive_failures > 0 {
                    tracing::info!(failures = receive_failures, "kafka receive recovered");
                    receive_failures = 0;
                }
                let (topic, partition, offset) =
                    (envelope.topic.clone(), envelope.partition, envelope.offset);
                let outcome = (options.on_message)(envelope).await;
                if let Err(err) = &outcome {
                    tracing::error!(
                        %topic,
                        partition,
                        offset,
                        error = %err,
                        "message dispatch failed"
                    );
                }
                match offsets.settle(&topic, partition, offset, &outcome) {
                    Settled::Store(next) => {
                        if let Err(err) = consumer.store_offset(&topic, partition, next) {
                            tracing::warn!(
                                %topic,
                                partition,
                                offset,
                                error = %err,
                                "failed to store offset"
                            );
                        }
                    }
                    Settled::Held(at) => {
                        tracing::warn!(
                            %topic,
                            partition,
                            offset,
                            held_at = at,
                            "offset held at failed message"
                        );
                    }
                }
            }
        }
    }

    if let Err(err) = consumer.commit_consumer_state(CommitMode::Sync) {
        tracing::debug!(error = %err, "final offset commit skipped");
    }
}

/// What to do with the stored offset after a message has been dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    /// Store this offset, the next one to read.
    Store(i64),
    /// The partition is held at this earlier failed offset.
    Held(i64),
}

/// Per-partition record of the first message whose listeners failed.
#[derive(Debug, Default)]
struct OffsetTracker {
    held: HashMap<(String, i32), i64>,
}

impl OffsetTracker {
    fn settle(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        outcome: &Result<(), DispatchError>,
    ) -> Settled {
        let slot = (topic.to_string(), partition);
        if let Some(&at) = self.held.get(&slot) {
            return Settled::Held(at);
        }
        match outcome {
            // Retrying cannot fix these; move past them.
            Ok(()) | Err(DispatchError::Decode(_)) | Err(DispatchError::MissingEvent { .. }) => {
                Settled::Store(offset + 1)
            }
            Err(DispatchError::Handler(_)) => {
                self.held.insert(slot, offset);
                Settled::Held(offset)
            }
        }
    }
}

fn receive_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    RECEIVE_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(RECEIVE_BACKOFF_MAX)
}

fn envelope<M: Message>(message: &M) -> Envelope {
    Envelope {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(Bytes::copy_from_slice),
        payload: message.payload().map(Bytes::copy_from_slice),
        timestamp: message.timestamp().to_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_processor_core::{DecodeError, EventKey, HandlerError, Phase};
    use rdkafka::{Timestamp, message::OwnedMessage};

    fn handler_failure() -> Result<(), DispatchError> {
        Err(DispatchError::Handler(HandlerError {
            phase: Phase::Event,
            event: EventKey::user("ping").unwrap(),
            failed: 1,
            total: 1,
            failures: vec!["db unavailable".into()],
        }))
    }

    #[test]
    fn test_client_config() {
        let plain = KafkaSettings::new("k1:9092,k2:9092", "orders").client_config();
        assert_eq!(plain.get("bootstrap.servers"), Some("k1:9092,k2:9092"));
        assert_eq!(plain.get("group.id"), Some("orders"));
        assert_eq!(plain.get("enable.auto.commit"), Some("false"));
        assert_eq!(plain.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(plain.get("security.protocol"), None);

        let mut settings = KafkaSettings::new("k1:9093", "orders");
        settings.tls = true;
        let tls = settings.client_config();
        assert_eq!(tls.get("security.protocol"), Some("ssl"));
        let verify = tls.get("enable.ssl.certificate.verification");
        assert_eq!(verify, Some("false"));
    }

    #[test]
    fn test_envelope_from_message() {
        let message = OwnedMessage::new(
            Some(br#"{"event":"ping"}"#.to_vec()),
            Some(b"user-1".to_vec()),
            "orders".to_string(),
            Timestamp::CreateTime(1_700_000_000_000),
            3,
            42,
            None,
        );
        let envelope = envelope(&message);

        assert_eq!(envelope.topic, "orders");
        assert_eq!(envelope.partition, 3);
        assert_eq!(envelope.offset, 42);
        assert_eq!(envelope.key.as_deref(), Some(&b"user-1"[..]));
        assert_eq!(envelope.payload_bytes(), br#"{"event":"ping"}"#);
        assert_eq!(envelope.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn test_tombstone_envelope() {
        let message = OwnedMessage::new(
            None,
            None,
            "orders".to_string(),
            Timestamp::NotAvailable,
            0,
            7,
            None,
        );
        let envelope = envelope(&message);

        assert_eq!(envelope.payload, None);
        assert_eq!(envelope.key, None);
        assert_eq!(envelope.timestamp, None);
    }

    #[test]
    fn test_handler_failure_holds_partition() {
        let mut offsets = OffsetTracker::default();

        assert_eq!(offsets.settle("t", 0, 9, &Ok(())), Settled::Store(10));
        let failed = offsets.settle("t", 0, 10, &handler_failure());
        assert_eq!(failed, Settled::Held(10));
        // A later success must not commit past the failed message.
        assert_eq!(offsets.settle("t", 0, 11, &Ok(())), Settled::Held(10));

        // Other partitions keep advancing.
        assert_eq!(offsets.settle("t", 1, 11, &Ok(())), Settled::Store(12));
        assert_eq!(offsets.settle("u", 0, 11, &Ok(())), Settled::Store(12));
    }

    #[test]
    fn test_unrecoverable_records_are_stepped_over() {
        let mut offsets = OffsetTracker::default();
        let undecodable = Err(DispatchError::Decode(DecodeError::EmptyPayload));
        let missing = Err(DispatchError::MissingEvent {
            field: "event".to_string(),
        });

        assert_eq!(offsets.settle("t", 0, 4, &undecodable), Settled::Store(5));
        assert_eq!(offsets.settle("t", 0, 5, &missing), Settled::Store(6));
        assert_eq!(offsets.settle("t", 0, 6, &Ok(())), Settled::Store(7));
    }

    #[test]
    fn test_receive_backoff_grows_and_caps() {
        assert_eq!(receive_backoff(1), Duration::from_millis(100));
        assert_eq!(receive_backoff(2), Duration::from_millis(200));
        assert_eq!(receive_backoff(4), Duration::from_millis(800));
        assert_eq!(receive_backoff(7), RECEIVE_BACKOFF_MAX);
        assert_eq!(receive_backoff(u32::MAX), RECEIVE_BACKOFF_MAX);
    }
}
