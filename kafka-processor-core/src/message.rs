//! Raw broker messages.

use bytes::Bytes;

/// A message as delivered by the broker client.
///
/// Carries the broker coordinates and the opaque payload. The dispatcher
/// reads it during a single dispatch and keeps nothing after it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition index within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Optional message key.
    pub key: Option<Bytes>,
    /// Message payload; `None` for tombstones.
    pub payload: Option<Bytes>,
    /// Broker timestamp in epoch milliseconds, when the broker provides one.
    pub timestamp: Option<i64>,
}

impl Envelope {
    /// Create an envelope with a payload and no key, offset 0 and no timestamp.
    pub fn new(topic: impl Into<String>, partition: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset: 0,
            key: None,
            payload: Some(payload.into()),
            timestamp: None,
        }
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the message key.
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the broker timestamp.
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Payload bytes, or an empty slice for tombstones.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}
