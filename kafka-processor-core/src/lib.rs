//! # kafka-processor-core
//!
//! Core types and contracts for the kafka-processor listener pipeline.
//!
//! This crate has minimal dependencies and is meant to be imported by code that
//! implements listeners or broker clients without needing the registry and
//! dispatcher from `kafka-processor-std`.
//!
//! # Pipeline
//!
//! Every message received from the broker goes through three phases:
//!
//! 1. **Start**: listeners registered under [`EventKey::Start`]
//! 2. **Event**: listeners registered under the record's event name
//! 3. **End**: listeners registered under [`EventKey::End`], which also see
//!    [`ProcessingMetadata`] for the event phase
//!
//! Listeners of one phase run concurrently; phases run strictly in order.
//!
//! # Error Types
//!
//! - [`DecodeError`] - The payload is not a JSON object
//! - [`HandlerError`] - Listener failures of one phase
//! - [`DispatchError`] - Why a message's pipeline was aborted
//! - [`BrokerError`] - Broker client failures

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod broker;
mod context;
mod error;
mod event;
mod listener;
mod message;

// Re-exports
pub use broker::{BrokerClient, DEFAULT_COMMIT_INTERVAL, MessageCallback, RunOptions, TopicSpec};
pub use context::{DecodedRecord, DispatchContext, KafkaCoordinates, ProcessingMetadata};
pub use error::{
    BoxError, BrokerError, DecodeError, DispatchError, HandlerError, InvalidEventName,
    ListenerPanic,
};
pub use event::{
    END_MESSAGE_PROCESSING, EventKey, EventName, Phase, RESERVED_PREFIX, START_MESSAGE_PROCESSING,
};
pub use listener::{DynListener, FnListener, Listener, ListenerHandle, listener_fn};
pub use message::Envelope;
