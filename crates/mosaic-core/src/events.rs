//! Typed page-wide event bus.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// Events broadcast to everything living on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// A reroute cycle is about to evaluate activity.
    BeforeRouting,
    /// The current route changed.
    RouteChanged {
        /// URL of the previous route, if any.
        previous_url: Option<String>,
        /// URL of the new route.
        url: String,
        /// Identifier of the new route.
        route_id: String,
    },
    /// Activation decisions of a reroute cycle have been applied.
    AppChange,
    /// Every slot touched by the transition has settled.
    SlotsSettled,
    /// The active locale changed.
    IntlChanged {
        /// The new locale.
        locale: String,
    },
}

impl PageEvent {
    /// Short name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeRouting => "before-routing",
            Self::RouteChanged { .. } => "route-changed",
            Self::AppChange => "app-change",
            Self::SlotsSettled => "slots-settled",
            Self::IntlChanged { .. } => "intl-changed",
        }
    }
}

/// Handle returned by [`PageEventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&PageEvent) + Send + Sync>;

/// Synchronous publish/subscribe for [`PageEvent`]s.
///
/// Listeners run in subscription order on the emitting task. A listener may
/// subscribe, unsubscribe or emit from inside its callback. An event emitted
/// from inside a callback is queued and delivered once the current event has
/// reached every listener, so all listeners observe events in the same order.
#[derive(Default)]
pub struct PageEventBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    /// Events queued by listeners, per delivering thread.
    pending: Mutex<HashMap<ThreadId, VecDeque<PageEvent>>>,
}

/// Clears the delivering thread's queue, also when a listener panics.
struct Delivery<'a> {
    bus: &'a PageEventBus,
    thread: ThreadId,
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        self.bus.pending.lock().remove(&self.thread);
    }
}

impl PageEventBus {
    /// Create a new bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PageEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver an event to every current listener.
    ///
    /// Called from inside a listener, the event is queued behind the one
    /// being delivered and this returns immediately. The outermost `emit`
    /// returns once the queue is drained.
    pub fn emit(&self, event: PageEvent) {
        let thread = thread::current().id();
        {
            let mut pending = self.pending.lock();
            if let Some(queue) = pending.get_mut(&thread) {
                queue.push_back(event);
                return;
            }
            pending.insert(thread, VecDeque::new());
        }

        let _delivery = Delivery { bus: self, thread };
        let mut next = Some(event);
        while let Some(event) = next {
            self.deliver(&event);
            next = self
                .pending
                .lock()
                .get_mut(&thread)
                .and_then(|queue| queue.pop_front());
        }
    }

    fn deliver(&self, event: &PageEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for PageEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageEventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let bus = PageEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = seen.clone();
        bus.subscribe(move |e| a.lock().push(format!("a:{}", e.name())));
        let b = seen.clone();
        bus.subscribe(move |e| b.lock().push(format!("b:{}", e.name())));

        bus.emit(PageEvent::SlotsSettled);

        assert_eq!(*seen.lock(), vec!["a:slots-settled", "b:slots-settled"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = PageEventBus::new();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| *c.lock() += 1);

        bus.emit(PageEvent::AppChange);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(PageEvent::AppChange);

        assert_eq!(*count.lock(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_emit_reentrantly() {
        let bus = Arc::new(PageEventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let s = seen.clone();
        bus.subscribe(move |e| {
            s.lock().push(e.name());
            if *e == PageEvent::AppChange {
                inner_bus.emit(PageEvent::SlotsSettled);
            }
        });

        bus.emit(PageEvent::AppChange);

        assert_eq!(*seen.lock(), vec!["app-change", "slots-settled"]);
    }

    #[test]
    fn test_nested_emit_delivered_after_current_event() {
        let bus = Arc::new(PageEventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let a = seen.clone();
        bus.subscribe(move |e| {
            a.lock().push(format!("a:{}", e.name()));
            if *e == PageEvent::AppChange {
                inner_bus.emit(PageEvent::SlotsSettled);
            }
        });
        let b = seen.clone();
        bus.subscribe(move |e| b.lock().push(format!("b:{}", e.name())));

        bus.emit(PageEvent::AppChange);

        assert_eq!(
            *seen.lock(),
            vec!["a:app-change", "b:app-change", "a:slots-settled", "b:slots-settled"]
        );
        assert!(bus.pending.lock().is_empty());
    }
}
