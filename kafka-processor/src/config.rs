//! Environment configuration.

use envconfig::Envconfig;
use kafka_processor_core::TopicSpec;
use kafka_processor_std::dispatch::{DispatchOptions, MissingEventPolicy};
use std::time::Duration;

/// Processor settings, read from the environment.
#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Comma separated bootstrap servers.
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    /// Reach the brokers over TLS.
    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    /// Consumer group id.
    #[envconfig(default = "kafka-processor")]
    pub kafka_consumer_group: String,

    /// Topic to consume.
    pub kafka_consumer_topic: String,

    /// Start from the earliest offset. Only applies when the group has no
    /// committed offset yet.
    #[envconfig(default = "false")]
    pub kafka_consumer_from_beginning: bool,

    /// Interval between offset commits.
    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: u64,

    /// Top-level record field naming the event.
    #[envconfig(default = "event")]
    pub event_field: String,

    /// `skip` or `reject` records without an event field.
    #[envconfig(default = "skip")]
    pub on_missing_event: MissingEventPolicy,
}

impl Config {
    /// Subscription derived from the topic settings.
    pub fn topic_spec(&self) -> TopicSpec {
        TopicSpec::new(self.kafka_consumer_topic.clone())
            .from_beginning(self.kafka_consumer_from_beginning)
    }

    /// Offset commit interval.
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.kafka_consumer_auto_commit_interval_ms)
    }

    /// Routing options for the dispatcher.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            event_field: self.event_field.clone(),
            on_missing_event: self.on_missing_event,
        }
    }

    /// Connection settings for the Kafka client.
    #[cfg(feature = "kafka")]
    pub fn kafka_settings(&self) -> kafka_processor_std::kafka::KafkaSettings {
        let mut settings = kafka_processor_std::kafka::KafkaSettings::new(
            self.kafka_hosts.clone(),
            self.kafka_consumer_group.clone(),
        );
        settings.tls = self.kafka_tls;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::init_from_hashmap(&vars(&[("KAFKA_CONSUMER_TOPIC", "orders")]))
            .unwrap();
        assert_eq!(config.kafka_hosts, "localhost:9092");
        assert!(!config.kafka_tls);
        assert_eq!(config.kafka_consumer_group, "kafka-processor");
        assert_eq!(config.commit_interval(), Duration::from_millis(5000));
        assert_eq!(config.topic_spec(), TopicSpec::new("orders"));
        assert_eq!(config.dispatch_options(), DispatchOptions::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::init_from_hashmap(&vars(&[
            ("KAFKA_CONSUMER_TOPIC", "orders"),
            ("KAFKA_CONSUMER_FROM_BEGINNING", "true"),
            ("KAFKA_CONSUMER_AUTO_COMMIT_INTERVAL_MS", "250"),
            ("EVENT_FIELD", "type"),
            ("ON_MISSING_EVENT", "reject"),
        ]))
        .unwrap();
        assert!(config.topic_spec().from_beginning);
        assert_eq!(config.commit_interval(), Duration::from_millis(250));
        assert_eq!(config.dispatch_options().event_field, "type");
        assert_eq!(
            config.dispatch_options().on_missing_event,
            MissingEventPolicy::Reject
        );
    }

    #[test]
    fn test_topic_is_required() {
        assert!(Config::init_from_hashmap(&HashMap::new()).is_err());
    }

    #[test]
    fn test_bad_policy_is_rejected() {
        let result = Config::init_from_hashmap(&vars(&[
            ("KAFKA_CONSUMER_TOPIC", "orders"),
            ("ON_MISSING_EVENT", "drop"),
        ]));
        assert!(result.is_err());
    }
}
