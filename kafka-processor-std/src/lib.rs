//! # kafka-processor-std
//!
//! Standard implementations for the kafka-processor listener pipeline.
//!
//! This crate provides:
//! - **Registry**: [`ListenerRegistry`](registry::ListenerRegistry), copy-on-read and
//!   safe to mutate from inside listeners
//! - **Dispatch**: [`Dispatcher`](dispatch::Dispatcher), the three-phase engine
//! - **Standard listeners**: Logging, Timeout
//! - **Testing**: recording listeners and an in-memory broker client
//! - **Kafka**: an `rdkafka` broker client (`kafka` feature)

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use kafka_processor_core;

// Modules
pub mod dispatch;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod listeners;
pub mod registry;
pub mod testing;
