// ── Push event dispatch ──
//
// Fan-out of push events to registered callbacks. Listeners are keyed by
// event kind and optionally scoped to one entity. Registration returns a
// handle; dropping the handle removes the listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gantry_api::{EntityId, EventKind};

use crate::model::PushEvent;

type Callback = Arc<dyn Fn(&PushEvent) + Send + Sync>;

struct Registration {
    id: u64,
    entity: Option<EntityId>,
    alive: Arc<AtomicBool>,
    callback: Callback,
}

impl Registration {
    fn wants(&self, event: &PushEvent) -> bool {
        self.entity
            .as_ref()
            .is_none_or(|entity| *entity == event.entity_id)
    }
}

#[derive(Default)]
struct DispatcherInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<Registration>>>,
}

impl DispatcherInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Registration>>> {
        // Callbacks never run under this lock, so a poisoned map is still
        // structurally sound.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut listeners = self.listeners();
        if let Some(list) = listeners.get_mut(&kind) {
            list.retain(|r| r.id != id);
            if list.is_empty() {
                listeners.remove(&kind);
            }
        }
    }
}

/// Routes push events to the callbacks registered for their kind.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every event of `kind`, whatever entity it names.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.register(kind, None, Arc::new(callback))
    }

    /// Call `callback` only for events of `kind` about `entity`.
    pub fn on_entity<F>(
        &self,
        kind: EventKind,
        entity: impl Into<EntityId>,
        callback: F,
    ) -> ListenerHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.register(kind, Some(entity.into()), Arc::new(callback))
    }

    fn register(&self, kind: EventKind, entity: Option<EntityId>, callback: Callback) -> ListenerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));
        self.inner
            .listeners()
            .entry(kind)
            .or_default()
            .push(Registration {
                id,
                entity,
                alive: Arc::clone(&alive),
                callback,
            });
        ListenerHandle {
            kind,
            id,
            alive,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to matching listeners in registration order.
    ///
    /// Returns how many listeners were called. Callbacks run after the
    /// listener table is released, so they may register or dispose
    /// listeners themselves. A listener disposed by an earlier callback is
    /// skipped for the rest of the same event.
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        let targets: Vec<(Arc<AtomicBool>, Callback)> = self
            .inner
            .listeners()
            .get(&event.kind)
            .map(|list| {
                list.iter()
                    .filter(|r| r.wants(event))
                    .map(|r| (Arc::clone(&r.alive), Arc::clone(&r.callback)))
                    .collect()
            })
            .unwrap_or_default();

        let mut called = 0;
        for (alive, callback) in &targets {
            if alive.load(Ordering::Acquire) {
                callback(event);
                called += 1;
            }
        }
        called
    }

    /// Listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.listeners().get(&kind).map_or(0, Vec::len)
    }
}

/// Keeps a listener registered. Drop it (or call [`dispose`](Self::dispose))
/// to stop receiving events. Disposing one listener never affects another,
/// even one with the same kind and callback.
#[must_use = "the listener is removed as soon as the handle is dropped"]
pub struct ListenerHandle {
    kind: EventKind,
    id: u64,
    alive: Arc<AtomicBool>,
    dispatcher: Weak<DispatcherInner>,
}

impl ListenerHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn dispose(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(inner) = self.dispatcher.upgrade() {
            inner.remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn console(entity: &str, line: &str) -> PushEvent {
        PushEvent {
            kind: EventKind::ConsoleLine,
            entity_id: EntityId::from(entity),
            payload: json!({"entityId": entity, "line": line}),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&PushEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        (count, move |_: &PushEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn kind_listener_sees_every_entity() {
        let dispatcher = Dispatcher::new();
        let (count, cb) = counter();
        let _h = dispatcher.on(EventKind::ConsoleLine, cb);

        dispatcher.dispatch(&console("S1", "a"));
        dispatcher.dispatch(&console("S2", "b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn entity_listener_is_scoped() {
        let dispatcher = Dispatcher::new();
        let (s1, cb1) = counter();
        let (s2, cb2) = counter();
        let _h1 = dispatcher.on_entity(EventKind::ConsoleLine, "S1", cb1);
        let _h2 = dispatcher.on_entity(EventKind::ConsoleLine, "S2", cb2);

        assert_eq!(dispatcher.dispatch(&console("S1", "only s1")), 1);
        assert_eq!(s1.load(Ordering::SeqCst), 1);
        assert_eq!(s2.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disposing_one_listener_leaves_the_other() {
        let dispatcher = Dispatcher::new();
        let (count, cb) = counter();
        let cb = Arc::new(cb);

        let first = {
            let cb = Arc::clone(&cb);
            dispatcher.on(EventKind::ConsoleLine, move |e| cb(e))
        };
        let _second = {
            let cb = Arc::clone(&cb);
            dispatcher.on(EventKind::ConsoleLine, move |e| cb(e))
        };
        assert_eq!(dispatcher.listener_count(EventKind::ConsoleLine), 2);

        first.dispose();
        assert_eq!(dispatcher.listener_count(EventKind::ConsoleLine), 1);

        dispatcher.dispatch(&console("S1", "x"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_of_other_kinds_are_not_delivered() {
        let dispatcher = Dispatcher::new();
        let (count, cb) = counter();
        let _h = dispatcher.on(EventKind::Status, cb);

        assert_eq!(dispatcher.dispatch(&console("S1", "x")), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                dispatcher.on(EventKind::ConsoleLine, move |_| order.lock().unwrap().push(i))
            })
            .collect();

        dispatcher.dispatch(&console("S1", "x"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(handles);
        assert_eq!(dispatcher.listener_count(EventKind::ConsoleLine), 0);
    }

    #[test]
    fn callback_may_dispose_listeners() {
        let dispatcher = Dispatcher::new();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let slot_in_cb = Arc::clone(&slot);
        let handle = dispatcher.on(EventKind::ConsoleLine, move |_| {
            slot_in_cb.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(dispatcher.dispatch(&console("S1", "once")), 1);
        assert_eq!(dispatcher.dispatch(&console("S1", "twice")), 0);
    }

    #[test]
    fn listener_disposed_mid_dispatch_is_not_called() {
        let dispatcher = Dispatcher::new();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let (late, cb) = counter();

        let slot_in_cb = Arc::clone(&slot);
        let _first = dispatcher.on(EventKind::ConsoleLine, move |_| {
            slot_in_cb.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(dispatcher.on(EventKind::ConsoleLine, cb));

        assert_eq!(dispatcher.dispatch(&console("S1", "x")), 1);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(EventKind::ConsoleLine), 1);
    }

    #[test]
    fn handle_outliving_dispatcher_is_harmless() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.on(EventKind::Stats, |_| {});
        drop(dispatcher);
        drop(handle);
    }
}
