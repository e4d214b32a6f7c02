//! Previous/current route pair shared by the page components.

use std::sync::Arc;

use mosaic_core::{PageEvent, PageEventBus, Route, SubscriptionId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Routes {
    previous: Arc<Route>,
    current: Arc<Route>,
    /// The current route was set by a navigation the next cycle has not seen.
    fresh: bool,
}

/// The route pair activity is evaluated against.
///
/// Every reroute cycle compares the previous route with the current one. A
/// cycle that does not follow a navigation (a forced remount, for instance)
/// compares the current route with itself.
#[derive(Debug, Default)]
pub struct RouteState {
    inner: Mutex<Routes>,
}

impl RouteState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the route of the initial page load.
    pub fn init(&self, route: Route) {
        let route = Arc::new(route);
        let mut inner = self.inner.lock();
        inner.previous = route.clone();
        inner.current = route;
        inner.fresh = false;
    }

    /// Make `route` current after a navigation. Returns the route it replaced.
    pub fn rotate(&self, route: Route) -> Arc<Route> {
        let mut inner = self.inner.lock();
        let replaced = inner.current.clone();
        if !inner.fresh {
            inner.previous = replaced.clone();
        }
        inner.current = Arc::new(route);
        inner.fresh = true;
        replaced
    }

    /// A reroute cycle is starting.
    pub fn on_before_routing(&self) {
        let mut inner = self.inner.lock();
        if inner.fresh {
            inner.fresh = false;
        } else {
            inner.previous = inner.current.clone();
        }
    }

    /// Follow reroute cycles on the page bus.
    pub fn attach(self: &Arc<Self>, bus: &PageEventBus) -> SubscriptionId {
        let state = Arc::clone(self);
        bus.subscribe(move |event| {
            if *event == PageEvent::BeforeRouting {
                state.on_before_routing();
            }
        })
    }

    /// The current route.
    pub fn current(&self) -> Arc<Route> {
        self.inner.lock().current.clone()
    }

    /// The previous route.
    pub fn previous(&self) -> Arc<Route> {
        self.inner.lock().previous.clone()
    }

    /// Previous and current route, read together.
    pub fn snapshot(&self) -> (Arc<Route>, Arc<Route>) {
        let inner = self.inner.lock();
        (inner.previous.clone(), inner.current.clone())
    }
}
