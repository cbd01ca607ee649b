//! Event-keyed listener registry.
//!
//! Each key maps to an ordered set of [`ListenerHandle`]s stored behind an
//! `Arc<[_]>`. Writers build a new slice and swap it in; readers clone the
//! `Arc`. A snapshot taken for a phase is therefore never affected by
//! listeners registering or removing themselves while it is iterated.

mod once;

use kafka_processor_core::{EventKey, Listener, ListenerHandle};
use once::OnceListener;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

type Entries = HashMap<EventKey, Arc<[ListenerHandle]>>;

/// A point-in-time copy of the listeners registered under one key.
pub type Snapshot = Arc<[ListenerHandle]>;

/// Shared, thread-safe mapping from [`EventKey`] to listeners.
///
/// Cloning the registry yields another handle to the same entries.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    entries: Arc<RwLock<Entries>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` under `key` and return its handle.
    ///
    /// Keep the handle to [`unregister`](ListenerRegistry::unregister) the
    /// listener later. Registering a handle already present under `key`
    /// changes nothing.
    pub fn register(&self, key: EventKey, listener: impl Into<ListenerHandle>) -> ListenerHandle {
        let listener = listener.into();
        self.insert(key, listener.clone());
        listener
    }

    /// Add `listener` under `key`.
    ///
    /// Returns `false` if that handle was already registered for `key`.
    pub fn insert(&self, key: EventKey, listener: ListenerHandle) -> bool {
        let mut entries = self.entries.write();
        let current = entries.get(&key);
        if current.is_some_and(|set| set.iter().any(|l| l.same(&listener))) {
            return false;
        }
        let mut next = current.map(|set| set.to_vec()).unwrap_or_default();
        next.push(listener);
        entries.insert(key, next.into());
        true
    }

    /// Remove `listener` from `key`.
    ///
    /// Returns `false` if it was not registered there.
    pub fn unregister(&self, key: &EventKey, listener: &ListenerHandle) -> bool {
        let mut entries = self.entries.write();
        let Some(current) = entries.get(key) else {
            return false;
        };
        if !current.iter().any(|l| l.same(listener)) {
            return false;
        }
        let next: Vec<_> = current
            .iter()
            .filter(|l| !l.same(listener))
            .cloned()
            .collect();
        if next.is_empty() {
            entries.remove(key);
        } else {
            entries.insert(key.clone(), next.into());
        }
        true
    }

    /// Register `listener` for a single invocation under `key`.
    ///
    /// The first dispatch to reach the wrapper removes it from the registry
    /// and then runs `listener`; any dispatch that already holds a snapshot
    /// containing the wrapper skips it. The returned handle identifies the
    /// wrapper and can be passed to [`ListenerRegistry::unregister`] to
    /// cancel the registration before it fires.
    pub fn register_once<L: Listener>(&self, key: EventKey, listener: L) -> ListenerHandle {
        let wrapper = OnceListener::new(key.clone(), ListenerHandle::new(listener), self);
        self.insert(key, wrapper.clone());
        wrapper
    }

    /// Snapshot of the listeners under `key`; empty when none are registered.
    pub fn handlers_for(&self, key: &EventKey) -> Snapshot {
        self.entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Whether `listener` is currently registered under `key`.
    pub fn contains(&self, key: &EventKey, listener: &ListenerHandle) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|set| set.iter().any(|l| l.same(listener)))
    }

    /// Number of listeners under `key`.
    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.entries.read().get(key).map_or(0, |set| set.len())
    }

    /// Keys that currently have at least one listener.
    pub fn event_keys(&self) -> Vec<EventKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Total number of registrations across all keys.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(|set| set.len()).sum()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn downgrade(&self) -> Weak<RwLock<Entries>> {
        Arc::downgrade(&self.entries)
    }

    fn from_entries(entries: Arc<RwLock<Entries>>) -> Self {
        Self { entries }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        let mut map = f.debug_map();
        for (key, set) in entries.iter() {
            map.entry(&key.as_str(), &set.len());
        }
        map.finish()
    }
}
