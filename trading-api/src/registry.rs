//! Thread-safe listener registry shared by the broker and the quote engine.
//!
//! Registration and removal come from client threads while dispatch runs on
//! venue-ingestion threads, so the registry never requires the order lock.
//! Dispatch iterates a snapshot of the listener set: a listener added while
//! an event is in flight misses that event and receives the next one, and a
//! removed listener receives nothing once removal returns.

use log::warn;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Outcome of fanning one event out to a channel's listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Multi-map from subscription key to registered listeners.
///
/// Listeners are held behind `Arc` and identified by pointer, so the same
/// listener value can be registered under several keys independently.
/// Channels without a per-instrument key use `()` as the key.
pub struct ListenerRegistry<K, L: ?Sized> {
    inner: RwLock<HashMap<K, Vec<Arc<L>>>>,
}

impl<K: Eq + Hash + Clone, L: ?Sized> ListenerRegistry<K, L> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a listener under `key`, after any already registered there.
    /// Returns the number of listeners now registered for the key.
    pub fn add(&self, key: K, listener: Arc<L>) -> usize {
        let mut map = self.inner.write().expect("listener registry poisoned");
        let entry = map.entry(key).or_default();
        entry.push(listener);
        entry.len()
    }

    /// Removes a listener (by `Arc` identity) from `key`. Removing a
    /// listener that was never registered is a no-op. Returns the number of
    /// listeners remaining for the key.
    pub fn remove(&self, key: &K, listener: &Arc<L>) -> usize {
        let mut map = self.inner.write().expect("listener registry poisoned");
        let remaining = match map.get_mut(key) {
            Some(entry) => {
                entry.retain(|l| !Arc::ptr_eq(l, listener));
                entry.len()
            }
            None => 0,
        };
        if remaining == 0 {
            map.remove(key);
        }
        remaining
    }

    /// The listeners currently registered for `key`, in registration order.
    pub fn snapshot(&self, key: &K) -> Vec<Arc<L>> {
        let map = self.inner.read().expect("listener registry poisoned");
        map.get(key).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        let map = self.inner.read().expect("listener registry poisoned");
        map.get(key).map(|v| v.len()).unwrap_or(0)
    }

    /// All keys with at least one registered listener.
    pub fn keys(&self) -> Vec<K> {
        let map = self.inner.read().expect("listener registry poisoned");
        map.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut map = self.inner.write().expect("listener registry poisoned");
        map.clear();
    }

    /// Delivers one event to every listener registered for `key`, in
    /// registration order. A panicking listener is isolated: the panic is
    /// caught and logged, and delivery continues with the next listener.
    pub fn dispatch<F>(&self, key: &K, channel: &str, f: F) -> DispatchOutcome
    where
        F: Fn(&L),
    {
        let mut outcome = DispatchOutcome::default();
        for listener in self.snapshot(key) {
            match catch_unwind(AssertUnwindSafe(|| f(&listener))) {
                Ok(()) => outcome.delivered += 1,
                Err(_) => {
                    outcome.failed += 1;
                    warn!("{} listener panicked during dispatch; continuing", channel);
                }
            }
        }
        outcome
    }
}

impl<K: Eq + Hash + Clone, L: ?Sized> Default for ListenerRegistry<K, L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Probe: Send + Sync {
        fn poke(&self);
    }

    struct Counter(AtomicUsize);

    impl Probe for Counter {
        fn poke(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Bomb;

    impl Probe for Bomb {
        fn poke(&self) {
            panic!("listener failure");
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter(AtomicUsize::new(0)))
    }

    #[test]
    fn dispatch_hits_all_listeners_in_registration_order() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let a = counter();
        let b = counter();
        registry.add("ES", a.clone());
        registry.add("ES", b.clone());

        let outcome = registry.dispatch(&"ES", "test", |l| l.poke());
        assert_eq!(outcome.delivered, 2);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unregistered_listener_is_a_noop() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let never_added: Arc<dyn Probe> = counter();
        assert_eq!(registry.remove(&"ES", &never_added), 0);
    }

    #[test]
    fn removed_listener_no_longer_receives_events() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let a = counter();
        let a_dyn: Arc<dyn Probe> = a.clone();
        registry.add("ES", a_dyn.clone());
        registry.dispatch(&"ES", "test", |l| l.poke());
        registry.remove(&"ES", &a_dyn);
        registry.dispatch(&"ES", "test", |l| l.poke());
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_later_listeners() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let after = counter();
        registry.add("ES", Arc::new(Bomb));
        registry.add("ES", after.clone());

        let outcome = registry.dispatch(&"ES", "test", |l| l.poke());
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(after.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_concurrent_registration() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let a = counter();
        registry.add("ES", a.clone());

        let snapshot = registry.snapshot(&"ES");
        registry.add("ES", counter());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.subscriber_count(&"ES"), 2);
    }

    #[test]
    fn keys_reflect_live_subscriptions_only() {
        let registry: ListenerRegistry<&str, dyn Probe> = ListenerRegistry::new();
        let a: Arc<dyn Probe> = counter();
        registry.add("ES", a.clone());
        registry.add("NQ", counter());
        registry.remove(&"ES", &a);

        assert_eq!(registry.keys(), vec!["NQ"]);
    }
}
