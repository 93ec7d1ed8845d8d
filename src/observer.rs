//! Observer registration lists.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Handle returned when registering an observer.
pub type ObserverId = u64;

/// Observers in registration order.
///
/// Notification iterates over a [`snapshot`](Self::snapshot), so observers
/// may be added or removed while a notification is in progress. An observer
/// added during a notification only sees later ones.
pub struct ObserverSet<T: ?Sized> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<T>)>>,
}

impl<T: ?Sized> Default for ObserverSet<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ObserverSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<T>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        id
    }

    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Current observers, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.observers.lock().iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_registration_order() {
        let set: ObserverSet<str> = ObserverSet::new();
        let a = set.add(Arc::from("a"));
        set.add(Arc::from("b"));
        set.add(Arc::from("c"));
        assert!(set.remove(a));
        assert!(!set.remove(a));
        let names: Vec<String> = set.snapshot().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
