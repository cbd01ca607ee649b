//! Error types for the processor.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`DecodeError`] - The payload could not be turned into a record
//! - [`HandlerError`] - One or more listeners in a phase failed
//! - [`DispatchError`] - Why a single message's pipeline was aborted
//! - [`BrokerError`] - Failures reported by the broker client
//! - [`InvalidEventName`] - A user event name was rejected

use crate::event::{EventKey, Phase};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A user event name was empty or fell into the reserved namespace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidEventName {
    /// The name was empty.
    #[error("event name must not be empty")]
    Empty,

    /// The name is reserved for pipeline phase hooks.
    #[error("event name `{0}` is in the reserved `processor:` namespace")]
    Reserved(String),
}

/// The payload could not be decoded into a structured record.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The message carried no payload.
    #[error("message has no payload")]
    EmptyPayload,

    /// The payload was not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was valid JSON but not an object.
    #[error("payload decoded to a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    /// The event field was present but not a string.
    #[error("event field `{field}` must be a string")]
    EventNotString {
        /// Name of the offending field.
        field: String,
    },

    /// The event field held an unusable name.
    #[error("event field holds an invalid name: {0}")]
    EventName(#[from] InvalidEventName),
}

/// One or more listeners of a phase failed.
///
/// Every listener of the phase has settled by the time this is produced;
/// `failures` holds each individual error in completion order.
#[derive(Error, Debug)]
#[error("{failed} of {total} listeners failed in {phase} phase for `{event}`")]
pub struct HandlerError {
    /// The phase whose fan-out failed.
    pub phase: Phase,
    /// The registry key the listeners were fetched for.
    pub event: EventKey,
    /// Number of failed listeners.
    pub failed: usize,
    /// Number of listeners invoked.
    pub total: usize,
    /// The individual failures.
    pub failures: Vec<BoxError>,
}

impl HandlerError {
    /// The first failure reported, if any.
    pub fn first(&self) -> Option<&BoxError> {
        self.failures.first()
    }
}

/// Why the pipeline for a single message was aborted.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The payload could not be decoded; no listener ran.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The record had no event field and the dispatcher rejects such records.
    #[error("record has no `{field}` field")]
    MissingEvent {
        /// The configured event field.
        field: String,
    },

    /// A phase failed; later phases were not entered.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
}

impl DispatchError {
    /// The phase that failed, when the failure came from listeners.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DispatchError::Handler(err) => Some(err.phase),
            _ => None,
        }
    }
}

/// Failures originating from the broker client, surfaced unchanged.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Transport could not be established.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// The topic subscription was refused.
    #[error("subscription error: {0}")]
    Subscription(#[source] BoxError),

    /// Consumption could not be started, stopped, paused or resumed.
    #[error("consumer error: {0}")]
    Consumer(#[source] BoxError),

    /// The operation needs a prior step (for example `run` before `connect`).
    #[error("broker client is not {0}")]
    NotReady(&'static str),
}

impl BrokerError {
    /// Wrap any error as a connection failure.
    pub fn connection(err: impl Into<BoxError>) -> Self {
        BrokerError::Connection(err.into())
    }

    /// Wrap any error as a subscription failure.
    pub fn subscription(err: impl Into<BoxError>) -> Self {
        BrokerError::Subscription(err.into())
    }

    /// Wrap any error as a consumer failure.
    pub fn consumer(err: impl Into<BoxError>) -> Self {
        BrokerError::Consumer(err.into())
    }
}

/// A listener panicked while handling a message.
#[derive(Error, Debug)]
#[error("listener panicked: {0}")]
pub struct ListenerPanic(pub String);
