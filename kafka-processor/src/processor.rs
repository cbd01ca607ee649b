//! Lifecycle controller.
//!
//! [`Processor`] drives a [`BrokerClient`] through
//! `Idle → Connected → Subscribed → Running → Stopped → Disconnected`,
//! hands it the dispatcher as the per-message callback and owns the
//! listener registry. Listener management never waits on lifecycle
//! transitions.

use crate::config::Config;
use kafka_processor_core::{
    BrokerClient, BrokerError, DEFAULT_COMMIT_INTERVAL, DispatchError, Envelope, EventKey,
    Listener, ListenerHandle, ProcessingMetadata, RunOptions, TopicSpec,
};
use kafka_processor_std::{
    dispatch::{DispatchOptions, Dispatcher},
    registry::ListenerRegistry,
};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;

/// Where a [`Processor`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    Idle,
    /// The broker transport is up.
    Connected,
    /// The topic subscription is in place.
    Subscribed,
    /// Messages are being dispatched.
    Running,
    /// Consumption halted; the transport is still up.
    Stopped,
    /// Terminal.
    Disconnected,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connected => "connected",
            LifecycleState::Subscribed => "subscribed",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Errors from lifecycle operations.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// The broker client failed; surfaced unchanged.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state at the time of the call.
        state: LifecycleState,
    },
}

/// Builder for [`Processor`].
pub struct ProcessorBuilder<B> {
    broker: B,
    topic: TopicSpec,
    commit_interval: Duration,
    options: DispatchOptions,
    registry: ListenerRegistry,
}

impl<B: BrokerClient> ProcessorBuilder<B> {
    /// Interval between automatic offset commits. Defaults to 5 seconds.
    pub fn commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Routing options for the dispatcher.
    pub fn dispatch_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing registry instead of a fresh one.
    pub fn registry(mut self, registry: ListenerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the processor.
    pub fn build(self) -> Processor<B> {
        let dispatcher = Dispatcher::with_options(self.registry.clone(), self.options);
        Processor {
            broker: self.broker,
            topic: self.topic,
            commit_interval: self.commit_interval,
            registry: self.registry,
            dispatcher: Arc::new(dispatcher),
            state: Mutex::new(LifecycleState::Idle),
        }
    }
}

/// Consumes a topic and routes every message through the listener pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let processor = Processor::new(client, TopicSpec::new("orders"));
/// processor
///     .on(EventKey::user("order.created")?, OrderCreated::new(db))
///     .on(EventKey::End, LoggingListener);
/// processor.start().await?;
/// ```
pub struct Processor<B> {
    broker: B,
    topic: TopicSpec,
    commit_interval: Duration,
    registry: ListenerRegistry,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<LifecycleState>,
}

impl<B: BrokerClient> Processor<B> {
    /// A processor with default options.
    pub fn new(broker: B, topic: TopicSpec) -> Self {
        Self::builder(broker, topic).build()
    }

    /// Start building a processor.
    pub fn builder(broker: B, topic: TopicSpec) -> ProcessorBuilder<B> {
        ProcessorBuilder {
            broker,
            topic,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            options: DispatchOptions::default(),
            registry: ListenerRegistry::new(),
        }
    }

    /// A processor configured from [`Config`].
    pub fn from_config(broker: B, config: &Config) -> Self {
        Self::builder(broker, config.topic_spec())
            .commit_interval(config.commit_interval())
            .dispatch_options(config.dispatch_options())
            .build()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Connect, subscribe and begin consuming.
    ///
    /// Steps already completed are not repeated, so a failed `start` can be
    /// retried. Restarting after [`Processor::stop`] subscribes again with
    /// an empty registry.
    pub async fn start(&self) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        if matches!(
            *state,
            LifecycleState::Running | LifecycleState::Disconnected
        ) {
            return Err(invalid("start", *state));
        }

        if *state == LifecycleState::Idle {
            self.broker.connect().await?;
            *state = LifecycleState::Connected;
            tracing::info!("connected");
        }

        if matches!(*state, LifecycleState::Connected | LifecycleState::Stopped) {
            self.broker.subscribe(&self.topic).await?;
            *state = LifecycleState::Subscribed;
            tracing::info!(topic = %self.topic.topic, "subscribed");
        }

        self.broker
            .run(RunOptions {
                commit_interval: self.commit_interval,
                on_message: self.dispatcher.clone().into_callback(),
            })
            .await?;
        *state = LifecycleState::Running;
        tracing::info!(
            topic = %self.topic.topic,
            commit_interval_ms = self.commit_interval.as_millis() as u64,
            "processor running"
        );
        Ok(())
    }

    /// Stop consuming and clear every registered listener.
    ///
    /// Dispatches already in flight are not cancelled.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    /// Stop, then release the broker transport. Terminal.
    pub async fn disconnect(&self) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        if *state == LifecycleState::Disconnected {
            return Ok(());
        }
        let was_idle = *state == LifecycleState::Idle;
        self.stop_locked(&mut state).await?;
        if !was_idle {
            self.broker.disconnect().await?;
        }
        *state = LifecycleState::Disconnected;
        tracing::info!("disconnected");
        Ok(())
    }

    /// Pause fetching. Listeners and the dispatcher are untouched.
    pub async fn pause(&self) -> Result<(), ProcessorError> {
        let state = self.state.lock().await;
        if *state != LifecycleState::Running {
            return Err(invalid("pause", *state));
        }
        self.broker.pause().await?;
        tracing::info!("paused");
        Ok(())
    }

    /// Resume fetching after [`Processor::pause`].
    pub async fn unpause(&self) -> Result<(), ProcessorError> {
        let state = self.state.lock().await;
        if *state != LifecycleState::Running {
            return Err(invalid("unpause", *state));
        }
        self.broker.unpause().await?;
        tracing::info!("unpaused");
        Ok(())
    }

    async fn stop_locked(&self, state: &mut LifecycleState) -> Result<(), ProcessorError> {
        match *state {
            LifecycleState::Disconnected => return Err(invalid("stop", *state)),
            LifecycleState::Running => {
                self.broker.stop().await?;
                *state = LifecycleState::Stopped;
                tracing::info!("processor stopped");
            }
            _ => {}
        }
        self.registry.clear();
        Ok(())
    }

    /// Add `listener` under `key` and return the handle that removes it.
    pub fn register(&self, key: EventKey, listener: impl Into<ListenerHandle>) -> ListenerHandle {
        self.registry.register(key, listener)
    }

    /// Remove `listener` from `key`. Returns `false` if it was not there.
    pub fn unregister(&self, key: &EventKey, listener: &ListenerHandle) -> bool {
        self.registry.unregister(key, listener)
    }

    /// Register `listener` to run for the next message under `key` only.
    pub fn register_once<L: Listener>(&self, key: EventKey, listener: L) -> ListenerHandle {
        self.registry.register_once(key, listener)
    }

    /// Chainable form of [`Processor::register`].
    ///
    /// The handle is dropped; pass a [`ListenerHandle`] you keep, or use
    /// [`Processor::register`], if the listener must be removed later.
    pub fn add_listener(&self, key: EventKey, listener: impl Into<ListenerHandle>) -> &Self {
        self.register(key, listener);
        self
    }

    /// Alias for [`Processor::add_listener`].
    pub fn on(&self, key: EventKey, listener: impl Into<ListenerHandle>) -> &Self {
        self.add_listener(key, listener)
    }

    /// Chainable form of [`Processor::unregister`].
    pub fn remove_listener(&self, key: &EventKey, listener: &ListenerHandle) -> &Self {
        self.unregister(key, listener);
        self
    }

    /// Alias for [`Processor::remove_listener`].
    pub fn off(&self, key: &EventKey, listener: &ListenerHandle) -> &Self {
        self.remove_listener(key, listener)
    }

    /// Chainable form of [`Processor::register_once`].
    pub fn once<L: Listener>(&self, key: EventKey, listener: L) -> &Self {
        self.register_once(key, listener);
        self
    }

    /// Run the pipeline for one message directly, bypassing the broker.
    pub async fn process(&self, envelope: Envelope) -> Result<ProcessingMetadata, DispatchError> {
        self.dispatcher.dispatch(envelope).await
    }

    /// The listener registry.
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// The dispatcher handed to the broker client.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The broker client.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// The subscription this processor uses.
    pub fn topic(&self) -> &TopicSpec {
        &self.topic
    }
}

fn invalid(operation: &'static str, state: LifecycleState) -> ProcessorError {
    ProcessorError::InvalidState { operation, state }
}
