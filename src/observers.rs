use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

pub type Observer = Arc<dyn Fn() + Send + Sync>;

/// Change listeners, de-duplicated by `Arc` identity.
///
/// Cloning yields a handle to the same registry, so an observer may hold one
/// and unregister itself while it is being notified.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<Mutex<Vec<Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the same observer was already registered.
    pub fn register(&self, observer: Observer) -> bool {
        let mut observers = self.lock();
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Returns false when the observer was not registered.
    pub fn remove(&self, observer: &Observer) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Calls every observer registered at the time of the call. The lock is
    /// released before the first call.
    pub fn notify(&self) {
        let snapshot: Vec<Observer> = self.lock().clone();
        trace!(count = snapshot.len(), "notifying observers");
        for observer in snapshot {
            observer();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
