//! The broker client contract.
//!
//! Connection management, subscription, offset commits and flow control all
//! belong to the broker client. The processor only drives it and supplies the
//! per-message callback.

use crate::{error::BrokerError, error::DispatchError, message::Envelope};
use futures::future::BoxFuture;
use std::{fmt, future::Future, sync::Arc, time::Duration};

/// Default interval between automatic offset commits.
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_millis(5000);

/// Per-message callback handed to [`BrokerClient::run`].
///
/// The returned future settles once the whole pipeline for the message has
/// completed or failed. What the broker client does with a failure (log,
/// retry, halt) is its own decision.
pub type MessageCallback =
    Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync>;

/// What to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name.
    pub topic: String,
    /// Start from the earliest offset when the group has no committed offset.
    pub from_beginning: bool,
}

impl TopicSpec {
    /// Subscribe to `topic` from the latest offset.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            from_beginning: false,
        }
    }

    /// Start from the earliest offset.
    pub fn from_beginning(mut self, from_beginning: bool) -> Self {
        self.from_beginning = from_beginning;
        self
    }
}

/// Options for [`BrokerClient::run`].
#[derive(Clone)]
pub struct RunOptions {
    /// Interval between automatic offset commits.
    pub commit_interval: Duration,
    /// Invoked once per received message.
    pub on_message: MessageCallback,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("commit_interval", &self.commit_interval)
            .finish_non_exhaustive()
    }
}

/// A client for a partitioned, log-based message broker.
///
/// `run` starts consumption and returns once messages are being delivered;
/// delivery continues in the background until `stop`. Messages of one
/// partition are delivered one at a time; partitions may be consumed
/// concurrently.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `BrokerClient`",
    label = "missing `BrokerClient` implementation"
)]
pub trait BrokerClient: Send + Sync + 'static {
    /// Establish the transport.
    fn connect(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Subscribe to a topic.
    fn subscribe(&self, spec: &TopicSpec) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Begin consuming, invoking `options.on_message` for each message.
    fn run(&self, options: RunOptions) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Stop consuming. In-flight callbacks are not cancelled.
    fn stop(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Release the transport.
    fn disconnect(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Stop fetching new messages without leaving the group.
    fn pause(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Resume fetching after [`BrokerClient::pause`].
    fn unpause(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}
