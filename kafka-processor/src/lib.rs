//! # kafka-processor - Event-Named Listener Pipeline
//!
//! `kafka-processor` attaches to a partitioned log broker, pulls messages from
//! one topic and routes each decoded JSON record through three phases:
//!
//! 1. listeners registered under [`EventKey::Start`]
//! 2. listeners registered under the record's event name
//! 3. listeners registered under [`EventKey::End`], which also receive
//!    [`ProcessingMetadata`] for phase 2
//!
//! Listeners within a phase run concurrently and are awaited together;
//! phases are strictly sequential.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kafka_processor::prelude::*;
//!
//! let config = Config::init_from_env()?;
//! let processor = Processor::from_config(KafkaClient::new(config.kafka_settings()), &config);
//!
//! processor
//!     .on(EventKey::user("order.created")?, listener_fn(|ctx| async move {
//!         let order: Order = ctx.event_as()?;
//!         ship(order).await
//!     }))
//!     .on(EventKey::End, LoggingListener);
//!
//! processor.start().await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub mod config;
pub mod processor;

pub use config::Config;
pub use processor::{LifecycleState, Processor, ProcessorBuilder, ProcessorError};

pub use kafka_processor_core::{
    BoxError, BrokerClient, BrokerError, DEFAULT_COMMIT_INTERVAL, DecodeError, DecodedRecord,
    DispatchContext, DispatchError, DynListener, END_MESSAGE_PROCESSING, Envelope, EventKey,
    EventName, FnListener, HandlerError, InvalidEventName, KafkaCoordinates, Listener,
    ListenerHandle, ListenerPanic, MessageCallback, Phase, ProcessingMetadata, RESERVED_PREFIX,
    RunOptions, START_MESSAGE_PROCESSING, TopicSpec, listener_fn,
};

pub use kafka_processor_std::{
    dispatch::{DispatchOptions, Dispatcher, MissingEventPolicy},
    registry::{ListenerRegistry, Snapshot},
};

/// Standard listener implementations.
pub mod listeners {
    pub use kafka_processor_std::listeners::LoggingListener;
    #[cfg(feature = "timeout")]
    pub use kafka_processor_std::listeners::{Timeout, TimeoutError};
}

/// Testing utilities.
pub mod testing {
    pub use kafka_processor_std::testing::{
        BrokerCall, CallLog, CountingListener, FailingListener, MemoryBroker, RecordingListener,
    };
}

/// Kafka broker client.
#[cfg(feature = "kafka")]
pub mod kafka {
    pub use kafka_processor_std::kafka::{KafkaClient, KafkaSettings};
}

/// Prelude module - common imports.
///
/// # Usage
///
/// ```rust,ignore
/// use kafka_processor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BoxError, BrokerClient, Config, DispatchContext, DispatchError, Envelope, EventKey,
        Listener, ListenerHandle, Processor, ProcessorError, TopicSpec, listener_fn,
        listeners::LoggingListener,
    };
    pub use envconfig::Envconfig;

    #[cfg(feature = "kafka")]
    pub use crate::kafka::{KafkaClient, KafkaSettings};
}
