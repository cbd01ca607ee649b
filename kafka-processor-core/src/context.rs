//! Decoded records and the per-message dispatch context.

use crate::{
    error::DecodeError,
    event::{EventKey, EventName},
    message::Envelope,
};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::time::Duration;

/// A message payload decoded as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord(Map<String, Value>);

impl DecodedRecord {
    /// Decode a payload. Anything but a JSON object is rejected.
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, DecodeError> {
        let bytes = payload.ok_or(DecodeError::EmptyPayload)?;
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DecodeError::NotAnObject(json_kind(&other))),
        }
    }

    /// Look up the event name held in `field`.
    ///
    /// Returns `Ok(None)` when the field is absent or `null`.
    pub fn event_name(&self, field: &str) -> Result<Option<EventName>, DecodeError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => Ok(Some(EventName::new(name.as_str())?)),
            Some(_) => Err(DecodeError::EventNotString {
                field: field.to_string(),
            }),
        }
    }

    /// Get a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for DecodedRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaCoordinates {
    /// Topic name.
    pub topic: String,
    /// Partition index.
    pub partition: i32,
    /// The raw message as delivered.
    pub message: Envelope,
}

impl From<Envelope> for KafkaCoordinates {
    fn from(message: Envelope) -> Self {
        Self {
            topic: message.topic.clone(),
            partition: message.partition,
            message,
        }
    }
}

/// Timing of the event-specific phase of one message.
///
/// Pre-processing time is not included; the clock starts after the start
/// phase has settled and stops once the event phase has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    /// Wall-clock time the event phase began.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_processing_on: DateTime<Utc>,
    /// Wall-clock time the event phase ended.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_processing_on: DateTime<Utc>,
    /// `end_processing_on - start_processing_on`, clamped at zero.
    #[serde(serialize_with = "duration_millis")]
    pub processing_duration: Duration,
}

impl ProcessingMetadata {
    /// Build metadata from two wall-clock readings.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_processing_on: start,
            end_processing_on: end,
            processing_duration: (end - start).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

fn duration_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Working data passed through the three dispatch phases of one message.
///
/// Created per message and dropped after the end phase; never shared
/// across messages.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    record: DecodedRecord,
    event: Option<EventName>,
    kafka: KafkaCoordinates,
    metadata: Option<ProcessingMetadata>,
}

impl DispatchContext {
    /// Attach broker coordinates to a decoded record.
    pub fn new(record: DecodedRecord, event: Option<EventName>, envelope: Envelope) -> Self {
        Self {
            record,
            event,
            kafka: envelope.into(),
            metadata: None,
        }
    }

    /// The decoded record.
    pub fn record(&self) -> &DecodedRecord {
        &self.record
    }

    /// The event name found in the record, if any.
    pub fn event(&self) -> Option<&EventName> {
        self.event.as_ref()
    }

    /// The registry key for the event phase, if the record named an event.
    pub fn event_key(&self) -> Option<EventKey> {
        self.event.clone().map(EventKey::User)
    }

    /// Broker coordinates.
    pub fn kafka(&self) -> &KafkaCoordinates {
        &self.kafka
    }

    /// Timing metadata. Only set for the end phase.
    pub fn metadata(&self) -> Option<&ProcessingMetadata> {
        self.metadata.as_ref()
    }

    /// Attach timing metadata.
    pub fn set_metadata(&mut self, metadata: ProcessingMetadata) {
        self.metadata = Some(metadata);
    }

    /// Get a top-level field of the record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    /// Deserialize the record into a caller-defined type.
    pub fn event_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(Value::Object(self.record.as_map().clone()))
    }

    /// Render the context as one flat JSON object: the record's fields plus
    /// `kafka` and, once set, `metadata`.
    pub fn to_value(&self) -> Value {
        let mut map = self.record.as_map().clone();
        let message = &self.kafka.message;
        let payload = String::from_utf8_lossy(message.payload_bytes()).into_owned();
        let key = message
            .key
            .as_deref()
            .map(|key| String::from_utf8_lossy(key).into_owned().into())
            .unwrap_or(Value::Null);
        map.insert(
            "kafka".to_string(),
            serde_json::json!({
                "topic": self.kafka.topic,
                "partition": self.kafka.partition,
                "message": {
                    "offset": message.offset,
                    "key": key,
                    "timestamp": message.timestamp,
                    "value": payload,
                },
            }),
        );
        if let Some(metadata) = &self.metadata {
            if let Ok(value) = serde_json::to_value(metadata) {
                map.insert("metadata".to_string(), value);
            }
        }
        Value::Object(map)
    }
}
