//! Testing utilities for kafka-processor.
//!
//! This module provides utilities to make testing listeners and the
//! lifecycle easier without a running broker.
//!
//! # Features
//!
//! - [`RecordingListener`]: Records every context it receives
//! - [`CountingListener`]: Counts invocations
//! - [`FailingListener`]: Always fails, counting its attempts
//! - [`CallLog`]: Shared log for asserting invocation order across listeners
//! - [`MemoryBroker`]: An in-memory [`BrokerClient`] that delivers messages on demand

use kafka_processor_core::{
    BoxError, BrokerClient, BrokerError, DispatchContext, DispatchError, Envelope, Listener,
    RunOptions, TopicSpec,
};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

// ============================================================================
// Call Log
// ============================================================================

/// A shared, append-only log of listener names.
///
/// Hand the same log to several [`RecordingListener`]s to check the order in
/// which they ran.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    /// A copy of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

// ============================================================================
// Recording Listener
// ============================================================================

/// A listener that records every context it receives.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingListener::new("h2");
/// registry.register(EventKey::user("ping")?, recorder.clone());
///
/// dispatcher.dispatch(envelope).await?;
///
/// let seen = recorder.contexts();
/// assert_eq!(seen[0].kafka().topic, "t");
/// ```
#[derive(Clone)]
pub struct RecordingListener {
    name: String,
    contexts: Arc<Mutex<Vec<DispatchContext>>>,
    log: Option<CallLog>,
}

impl RecordingListener {
    /// Create a recording listener.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contexts: Arc::new(Mutex::new(Vec::new())),
            log: None,
        }
    }

    /// Also append this listener's name to `log` on every call.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// The listener's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a clone of the recorded contexts.
    pub fn contexts(&self) -> Vec<DispatchContext> {
        self.contexts.lock().clone()
    }

    /// Get the number of recorded contexts.
    pub fn count(&self) -> usize {
        self.contexts.lock().len()
    }
}

impl Listener for RecordingListener {
    async fn on_message(&self, ctx: &DispatchContext) -> Result<(), BoxError> {
        if let Some(log) = &self.log {
            log.push(self.name.clone());
        }
        self.contexts.lock().push(ctx.clone());
        Ok(())
    }
}

// ============================================================================
// Counting Listener
// ============================================================================

/// A listener that counts invocations.
#[derive(Debug, Clone, Default)]
pub struct CountingListener {
    count: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Create a new counting listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Listener for CountingListener {
    async fn on_message(&self, _ctx: &DispatchContext) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Failing Listener
// ============================================================================

/// A listener that always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingListener {
    message: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingListener {
    /// Create a listener failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times it was invoked.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Listener for FailingListener {
    async fn on_message(&self, _ctx: &DispatchContext) -> Result<(), BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.message.clone().into())
    }
}

// ============================================================================
// Memory Broker
// ============================================================================

/// A call made against a [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    /// `connect`
    Connect,
    /// `subscribe`
    Subscribe(TopicSpec),
    /// `run`
    Run {
        /// Commit interval the consumer was started with.
        commit_interval: Duration,
    },
    /// `stop`
    Stop,
    /// `disconnect`
    Disconnect,
    /// `pause`
    Pause,
    /// `unpause`
    Unpause,
}

#[derive(Default)]
struct MemoryBrokerInner {
    calls: Mutex<Vec<BrokerCall>>,
    run: Mutex<Option<RunOptions>>,
    paused: AtomicBool,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
}

/// An in-memory broker client.
///
/// Records every call and keeps the callback passed to `run`, so tests can
/// push messages through the real dispatch path with [`MemoryBroker::deliver`].
/// Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<MemoryBrokerInner>,
}

impl MemoryBroker {
    /// Create a broker that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make the next `subscribe` calls fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.inner.calls.lock().clone()
    }

    /// Whether a consumer is running.
    pub fn is_running(&self) -> bool {
        self.inner.run.lock().is_some()
    }

    /// Whether consumption is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Deliver a message to the running consumer's callback.
    ///
    /// Returns `None` without invoking anything when no consumer is running
    /// or consumption is paused.
    pub async fn deliver(&self, envelope: Envelope) -> Option<Result<(), DispatchError>> {
        if self.is_paused() {
            return None;
        }
        let callback = {
            let run = self.inner.run.lock();
            run.as_ref().map(|run| run.on_message.clone())?
        };
        Some(callback(envelope).await)
    }

    fn record(&self, call: BrokerCall) {
        self.inner.calls.lock().push(call);
    }
}

impl BrokerClient for MemoryBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Connect);
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::connection("connection refused"));
        }
        Ok(())
    }

    async fn subscribe(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        self.record(BrokerCall::Subscribe(spec.clone()));
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::subscription(format!(
                "unknown topic `{}`",
                spec.topic
            )));
        }
        Ok(())
    }

    async fn run(&self, options: RunOptions) -> Result<(), BrokerError> {
        self.record(BrokerCall::Run {
            commit_interval: options.commit_interval,
        });
        *self.inner.run.lock() = Some(options);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Stop);
        self.inner.run.lock().take();
        self.inner.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Disconnect);
        self.inner.run.lock().take();
        Ok(())
    }

    async fn pause(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Pause);
        self.inner.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unpause(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Unpause);
        self.inner.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}
