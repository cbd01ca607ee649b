//! # Listeners
//!
//! A listener is a callback invoked with the [`DispatchContext`] of a message.
//! Listeners are registered under an [`EventKey`] and run concurrently with the
//! other listeners of the same phase.
//!
//! # Static vs Dynamic Dispatch
//!
//! [`Listener`] uses native `async fn` for zero-cost static dispatch.
//! The registry stores [`ListenerHandle`]s, which wrap the object-safe
//! [`DynListener`] and give every registration an identity.
//!
//! [`EventKey`]: crate::EventKey

use crate::{context::DispatchContext, error::BoxError};
use std::{fmt, future::Future, pin::Pin, sync::Arc};

/// A callback invoked for each message routed to its key.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Listener`",
    label = "missing `Listener` implementation",
    note = "Listeners must implement `on_message`, or be built with `listener_fn`."
)]
pub trait Listener: Send + Sync + 'static {
    /// Handle one message.
    fn on_message(
        &self,
        ctx: &DispatchContext,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Dynamic object-safe version of [`Listener`].
pub trait DynListener: Send + Sync + 'static {
    /// Handle one message (dynamic dispatch version).
    fn on_message_dyn<'a>(
        &'a self,
        ctx: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>;
}

// Blanket implementation: Any type implementing Listener implements DynListener automatically.
impl<L: Listener> DynListener for L {
    fn on_message_dyn<'a>(
        &'a self,
        ctx: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>> {
        Box::pin(self.on_message(ctx))
    }
}

/// A shared, identity-comparable reference to a registered listener.
///
/// Two handles are equal when they point at the same allocation, so cloning
/// a handle and registering both clones is a single registration.
#[derive(Clone)]
pub struct ListenerHandle(Arc<dyn DynListener>);

impl ListenerHandle {
    /// Wrap a listener in a new handle.
    pub fn new<L: Listener>(listener: L) -> Self {
        Self(Arc::new(listener))
    }

    /// Wrap an already shared listener.
    pub fn from_arc(listener: Arc<dyn DynListener>) -> Self {
        Self(listener)
    }

    /// Invoke the listener.
    pub fn call<'a>(
        &'a self,
        ctx: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>> {
        self.0.on_message_dyn(ctx)
    }

    /// Whether two handles refer to the same listener.
    pub fn same(&self, other: &ListenerHandle) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for ListenerHandle {}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerHandle").field(&self.addr()).finish()
    }
}

impl<L: Listener> From<L> for ListenerHandle {
    fn from(listener: L) -> Self {
        Self::new(listener)
    }
}

impl From<Arc<dyn DynListener>> for ListenerHandle {
    fn from(listener: Arc<dyn DynListener>) -> Self {
        Self::from_arc(listener)
    }
}

/// A listener built from an async closure.
///
/// The closure receives its own copy of the context, so its future does not
/// borrow from the dispatcher.
pub struct FnListener<F> {
    f: F,
}

/// Build a listener from an async closure.
///
/// ```rust,ignore
/// let handle = listener_fn(|ctx| async move {
///     tracing::info!(topic = %ctx.kafka().topic, "got message");
///     Ok(())
/// });
/// ```
pub fn listener_fn<F, Fut>(f: F) -> FnListener<F>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    FnListener { f }
}

impl<F, Fut> Listener for FnListener<F>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn on_message(
        &self,
        ctx: &DispatchContext,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        (self.f)(ctx.clone())
    }
}
