//! Subscriber registry used to fan snapshots out to UI callbacks.
//!
//! Callbacks run synchronously in registration order. Each invocation is
//! isolated with `catch_unwind`, so one panicking subscriber neither stops
//! delivery to the rest nor corrupts the list. Delivery iterates over a copy
//! of the list, which lets callbacks subscribe or unsubscribe re-entrantly.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use metrics::counter;
use tracing::{debug, warn};

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::subscribers";
pub(crate) const METRIC_SUBSCRIBER_PANIC: &str = "vitrine_subscriber_panic_total";

/// Snapshot callback registered by a UI consumer.
pub type Callback<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync + 'static>;

struct Registered<T> {
    id: u64,
    callback: Callback<T>,
}

struct Inner<T> {
    next_id: u64,
    entries: Vec<Registered<T>>,
}

struct Shared<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64) -> bool;
}

impl<T: Send + Sync + 'static> Unsubscribe for Shared<T> {
    fn remove(&self, id: u64) -> bool {
        let mut inner = mutex_lock(&self.inner, SOURCE, "remove");
        let before = inner.entries.len();
        inner.entries.retain(|entry| entry.id != id);
        let removed = inner.entries.len() != before;
        if removed {
            debug!(registry = self.name, subscriber = id, "Subscriber removed");
        }
        removed
    }
}

/// Ordered set of snapshot callbacks.
pub struct SubscriberRegistry<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> SubscriberRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                inner: Mutex::new(Inner {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Register `callback` for future snapshots. Nothing is replayed on registration.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = mutex_lock(&self.shared.inner, SOURCE, "subscribe");
            let id = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);
            inner.entries.push(Registered {
                id,
                callback: Arc::new(callback),
            });
            id
        };
        debug!(registry = self.shared.name, subscriber = id, "Subscriber added");

        let shared: Arc<dyn Unsubscribe> = self.shared.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&shared),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `snapshot` to every registered callback.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn notify(&self, snapshot: &Arc<T>) -> usize {
        let callbacks: Vec<(u64, Callback<T>)> = {
            let inner = mutex_lock(&self.shared.inner, SOURCE, "notify");
            inner
                .entries
                .iter()
                .map(|entry| (entry.id, entry.callback.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    counter!(METRIC_SUBSCRIBER_PANIC, "registry" => self.shared.name).increment(1);
                    warn!(
                        registry = self.shared.name,
                        subscriber = id,
                        reason = %reason,
                        "Subscriber callback panicked; continuing fan-out"
                    );
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.shared.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered callback. Outstanding handles become no-ops.
    pub fn clear(&self) {
        mutex_lock(&self.shared.inner, SOURCE, "clear").entries.clear();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Unsubscribe>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the callback. Safe to call any number of times.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter_callback(hits: &Arc<AtomicUsize>) -> impl Fn(&Arc<u32>) + Send + Sync + 'static {
        let hits = hits.clone();
        move |_: &Arc<u32>| {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));

        let _a = registry.subscribe(counter_callback(&first));
        let _b = registry.subscribe(|_| panic!("subscriber failure"));
        let _c = registry.subscribe(counter_callback(&third));

        let delivered = registry.notify(&Arc::new(1));

        assert_eq!(delivered, 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 3);

        registry.notify(&Arc::new(2));
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(third.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let subscription = registry.subscribe(counter_callback(&hits));

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());

        registry.notify(&Arc::new(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_its_own_callback() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let kept = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        let _kept = registry.subscribe(counter_callback(&kept));
        let gone = registry.subscribe(counter_callback(&removed));
        gone.unsubscribe();

        registry.notify(&Arc::new(1));
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callbacks_receive_the_published_snapshot() {
        let registry = SubscriberRegistry::<String>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = registry.subscribe(move |snapshot: &Arc<String>| {
            sink.lock().unwrap().push(snapshot.clone());
        });

        let published = Arc::new("v1".to_string());
        registry.notify(&published);

        let seen = seen.lock().unwrap();
        assert!(Arc::ptr_eq(&seen[0], &published));
    }

    #[test]
    fn re_entrant_subscribe_and_unsubscribe_during_notify() {
        let registry = Arc::new(SubscriberRegistry::<u32>::new("test"));
        let late_hits = Arc::new(AtomicUsize::new(0));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_registry = registry.clone();
        let inner_slot = slot.clone();
        let inner_hits = late_hits.clone();
        let self_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let self_slot_inner = self_slot.clone();

        let me = registry.subscribe(move |_| {
            let late = inner_registry.subscribe(counter_callback(&inner_hits));
            *inner_slot.lock().unwrap() = Some(late);
            if let Some(me) = self_slot_inner.lock().unwrap().as_ref() {
                me.unsubscribe();
            }
        });
        *self_slot.lock().unwrap() = Some(me);

        registry.notify(&Arc::new(1));
        // The late subscriber was added after the copy was taken.
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);

        registry.notify(&Arc::new(2));
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handles_outliving_registry_are_inert() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let subscription = registry.subscribe(|_| {});
        drop(registry);
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn clear_drops_all_callbacks() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let subscription = registry.subscribe(counter_callback(&hits));
        registry.clear();
        registry.notify(&Arc::new(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!subscription.unsubscribe());
    }
}
