//! Listener registries.
//!
//! Every component that fires notifications keeps its listeners in a
//! [`ListenerRegistry`]. Registration and removal take a short lock; dispatch
//! works on a snapshot, so a listener may register or remove listeners (or
//! trigger further events) while it is being notified.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An ordered, duplicate-free set of shared listeners.
pub struct ListenerRegistry<L: ?Sized> {
    listeners: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Arc<L>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener.
    ///
    /// Registering the same `Arc` twice is a no-op. Returns true if the
    /// listener was added.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut listeners = self.guard();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes a listener. Unknown listeners are ignored.
    ///
    /// Returns true if the listener was registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.guard();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Returns true if `listener` is registered.
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.guard().iter().any(|l| Arc::ptr_eq(l, listener))
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Returns true if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Returns a copy of the current listener list.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.guard().clone()
    }

    /// Calls `notify` on every listener, in registration order.
    ///
    /// The lock is released before the first call.
    pub fn dispatch<F>(&self, mut notify: F)
    where
        F: FnMut(&L),
    {
        for listener in self.snapshot() {
            notify(&listener);
        }
    }
}

impl<L: ?Sized> fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}
