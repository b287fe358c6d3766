//! Explicit observer registration for engine notifications.
//!
//! Instead of dispatching through an ambient platform event bus, AuthKit
//! owns an observer registry: consumers register a callback and hold the
//! returned [`Subscription`] for as long as they want to listen. Dropping
//! (or explicitly unsubscribing) the handle removes the observer, so
//! non-browser hosts and tests can observe events without any global state.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

use crate::state::State;

type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;
type Registry<E> = Mutex<HashMap<u64, Observer<E>>>;

/// Engine notifications emitted while driving a flow.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Fired synchronously before an action's network call; carries the
    /// state being left.
    BeforeStateChange {
        /// The state whose action is about to run.
        state: Arc<State>,
    },
    /// Fired once the next state (after auto-stepping) has been built.
    AfterStateChange {
        /// The state the flow arrived at.
        state: Arc<State>,
    },
}

/// A clonable registry of event observers.
pub struct Dispatcher<E> {
    observers: Arc<Registry<E>>,
    next_id: Arc<AtomicU64>,
}

impl<E> Dispatcher<E> {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers `observer` and returns its subscription handle.
    ///
    /// The observer is removed when the handle is dropped or explicitly
    /// unsubscribed.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(observer));

        let registry = Arc::downgrade(&self.observers);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                }
            })),
        }
    }

    /// Delivers `event` to every currently registered observer.
    ///
    /// Observers are collected before invocation, so an observer may
    /// subscribe or unsubscribe from within its callback.
    pub fn dispatch(&self, event: &E) {
        let observers: Vec<Observer<E>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer(event);
        }
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Handle for one registered observer; unsubscribes on drop.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Removes the observer now instead of waiting for drop.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
