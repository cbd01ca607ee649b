//! Self-removing single-shot listener.

use super::{Entries, ListenerRegistry};
use kafka_processor_core::{BoxError, DispatchContext, EventKey, Listener, ListenerHandle};
use parking_lot::RwLock;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

/// Wraps a listener so it runs at most once, removing itself from the
/// registry before the wrapped listener is invoked.
pub(super) struct OnceListener {
    key: EventKey,
    inner: ListenerHandle,
    registry: Weak<RwLock<Entries>>,
    fired: AtomicBool,
    this: Weak<OnceListener>,
}

impl OnceListener {
    pub(super) fn new(
        key: EventKey,
        inner: ListenerHandle,
        registry: &ListenerRegistry,
    ) -> ListenerHandle {
        let wrapper = Arc::new_cyclic(|this| OnceListener {
            key,
            inner,
            registry: registry.downgrade(),
            fired: AtomicBool::new(false),
            this: this.clone(),
        });
        ListenerHandle::from_arc(wrapper)
    }

    fn detach(&self) {
        let (Some(entries), Some(this)) = (self.registry.upgrade(), self.this.upgrade()) else {
            return;
        };
        let handle = ListenerHandle::from_arc(this);
        ListenerRegistry::from_entries(entries).unregister(&self.key, &handle);
    }
}

impl Listener for OnceListener {
    async fn on_message(&self, ctx: &DispatchContext) -> Result<(), BoxError> {
        // Concurrent dispatches may share a snapshot holding this wrapper;
        // only the first one through here invokes the listener.
        if self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.detach();
        self.inner.call(ctx).await
    }
}
