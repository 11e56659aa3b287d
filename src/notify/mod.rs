//! In-process publish/subscribe bus for cache and vault-write events.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Event kinds the bus knows how to route. Mirrors the kinds in the data
/// model: cache invalidation plus file/directory/tag writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    CacheInvalidated,
    FileCreated,
    FileUpdated,
    FileDeleted,
    DirectoryCreated,
    DirectoryDeleted,
    TagAdded,
    TagRemoved,
}

/// A single published event. `path` is populated for file/directory/tag
/// events; `keys` is populated for explicit `cache:invalidated` events.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub path: Option<String>,
    pub keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            path: None,
            keys: Vec::new(),
            timestamp: Utc::now(),
            metadata: Value::Null,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: u64,
    kind: EventKind,
    callback: Callback,
}

struct NotificationBusInner {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: Mutex<u64>,
}

impl NotificationBusInner {
    fn remove(&self, id: u64) {
        let mut subs = self.subscriptions.lock().expect("bus mutex poisoned");
        subs.retain(|s| s.id != id);
    }
}

/// Handle returned by [`NotificationBus::subscribe`]. Dropping it leaves the
/// subscription active — call `unsubscribe` explicitly to remove it.
pub struct Unsubscribe {
    bus: Arc<NotificationBusInner>,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.bus.remove(self.id);
    }
}

/// Synchronous, in-process pub/sub. Delivery happens on the caller's task,
/// in registration order, from a snapshot of subscribers taken at the start
/// of `emit` — so a subscriber that unsubscribes itself mid-delivery does
/// not disturb delivery to subsequent callbacks in the same `emit`. The bus
/// does not swallow subscriber panics; that is intentional, to surface
/// wiring bugs during development rather than hide them.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<NotificationBusInner>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NotificationBusInner {
                subscriptions: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// Registers `callback` for events of `kind`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let mut next_id = self.inner.next_id.lock().expect("bus mutex poisoned");
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        self.inner
            .subscriptions
            .lock()
            .expect("bus mutex poisoned")
            .push(Subscription {
                id,
                kind,
                callback: Arc::new(callback),
            });

        Unsubscribe {
            bus: self.inner.clone(),
            id,
        }
    }

    /// Delivers `event` to every subscriber of its kind, in registration
    /// order.
    pub fn emit(&self, event: Event) {
        let callbacks: Vec<Callback> = {
            let subs = self.inner.subscriptions.lock().expect("bus mutex poisoned");
            subs.iter()
                .filter(|s| s.kind == event.kind)
                .map(|s| s.callback.clone())
                .collect()
        };

        for callback in callbacks {
            callback(&event);
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_receives_emitted_event() {
        let bus = NotificationBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _sub = bus.subscribe(EventKind::FileUpdated, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Event::new(EventKind::FileUpdated).with_path("a.md"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_invoked_in_registration_order() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _s1 = bus.subscribe(EventKind::TagAdded, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        let _s2 = bus.subscribe(EventKind::TagAdded, move |_| o2.lock().unwrap().push(2));
        let o3 = order.clone();
        let _s3 = bus.subscribe(EventKind::TagAdded, move |_| o3.lock().unwrap().push(3));

        bus.emit(Event::new(EventKind::TagAdded));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let bus = NotificationBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _sub = bus.subscribe(EventKind::TagAdded, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Event::new(EventKind::FileUpdated));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = NotificationBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let sub = bus.subscribe(EventKind::FileDeleted, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        bus.emit(Event::new(EventKind::FileDeleted));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn self_unsubscribe_during_delivery_does_not_disturb_later_callbacks() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();

        // The first subscriber unsubscribes itself while `emit` is still
        // delivering to the rest — this only works because `emit` snapshots
        // the callback list before invoking any of them.
        let handle: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let handle2 = handle.clone();
        let o1 = order.clone();
        let sub = inner_bus.subscribe(EventKind::TagAdded, move |_| {
            o1.lock().unwrap().push(1);
            if let Some(h) = handle2.lock().unwrap().take() {
                h.unsubscribe();
            }
        });
        *handle.lock().unwrap() = Some(sub);

        let o2 = order.clone();
        let _s2 = bus.subscribe(EventKind::TagAdded, move |_| o2.lock().unwrap().push(2));

        bus.emit(Event::new(EventKind::TagAdded));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);

        order.lock().unwrap().clear();
        bus.emit(Event::new(EventKind::TagAdded));
        assert_eq!(*order.lock().unwrap(), vec![2]);
    }
}
