//! Initial slot discovery and inline slot overrides.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use mosaic_core::{AppDescriptor, PageEvent, PageEventBus, RenderSurface, SubscriptionId};
use mosaic_loader::ModuleLoader;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Per-slot overrides embedded in the page by server-side rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SlotOverrides {
    /// Bundle replacing the descriptor's.
    pub spa_bundle: Option<String>,
    /// Stylesheet replacing the descriptor's.
    pub css_bundle: Option<String>,
    /// Props merged into a wrapper's mount props.
    pub wrapper_props: Option<Value>,
    /// The wrapped application is already rendered inside the slot.
    pub wrapped_rendered: bool,
    /// Module import overrides, name to location.
    pub dependencies: BTreeMap<String, String>,
}

impl SlotOverrides {
    /// Whether nothing is overridden.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the bundle overrides to a descriptor copy.
    pub fn apply_to(&self, descriptor: &mut AppDescriptor) {
        if let Some(bundle) = &self.spa_bundle {
            descriptor.spa_bundle = Some(bundle.clone());
        }
        if let Some(href) = &self.css_bundle {
            descriptor.css_bundle = Some(href.clone());
        }
        for (name, location) in &self.dependencies {
            descriptor.dependencies.insert(name.clone(), location.clone());
        }
    }
}

#[derive(Debug, Default)]
struct ReadyState {
    ready: HashSet<String>,
    routing_started: bool,
}

/// Holds back unit loading until the server-rendered slots are known.
///
/// A slot becomes ready when the page reports it (initial slot discovery).
/// Once the first navigation starts, waiting stops for every slot and no
/// overrides apply.
pub struct SlotReadiness {
    surface: Arc<dyn RenderSurface>,
    modules: Arc<dyn ModuleLoader>,
    state: Mutex<ReadyState>,
    notify: Notify,
}

impl SlotReadiness {
    /// Create a synchronizer.
    pub fn new(surface: Arc<dyn RenderSurface>, modules: Arc<dyn ModuleLoader>) -> Self {
        Self {
            surface,
            modules,
            state: Mutex::new(ReadyState::default()),
            notify: Notify::new(),
        }
    }

    /// Stop waiting once a navigation changes the route.
    pub fn attach(self: &Arc<Self>, bus: &PageEventBus) -> SubscriptionId {
        let readiness = Arc::clone(self);
        bus.subscribe(move |event| {
            if let PageEvent::RouteChanged { .. } = event {
                readiness.on_routing_started();
            }
        })
    }

    /// Report a slot as present on the page.
    pub fn mark_slot_ready(&self, slot: &str) {
        let inserted = self.state.lock().ready.insert(slot.to_string());
        if inserted {
            debug!(slot, "slot ready");
            self.notify.notify_waiters();
        }
    }

    /// The first route transition began.
    pub fn on_routing_started(&self) {
        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.routing_started, true)
        };
        if first {
            debug!("routing started, slot waits released");
            self.notify.notify_waiters();
        }
    }

    /// Whether a slot was reported.
    pub fn is_ready(&self, slot: &str) -> bool {
        self.state.lock().ready.contains(slot)
    }

    /// Wait until `slot` may load, returning its inline overrides.
    pub async fn wait_for_slot(&self, slot: &str) -> SlotOverrides {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (ready, routing_started) = {
                let state = self.state.lock();
                (state.ready.contains(slot), state.routing_started)
            };
            if routing_started {
                return SlotOverrides::default();
            }
            if ready {
                return self.take_overrides(slot);
            }
            notified.await;
        }
    }

    fn take_overrides(&self, slot: &str) -> SlotOverrides {
        if self.surface.slot_element(slot).is_none() {
            warn!(slot, "slot element missing, no overrides");
            return SlotOverrides::default();
        }
        let Some(raw) = self.surface.take_slot_config(slot) else {
            return SlotOverrides::default();
        };

        let overrides = match serde_json::from_str::<SlotOverrides>(&raw) {
            Ok(overrides) => overrides,
            Err(err) => {
                warn!(slot, error = %err, "malformed slot overrides ignored");
                return SlotOverrides::default();
            }
        };
        for (name, location) in &overrides.dependencies {
            self.modules.override_import(name, location);
        }
        debug!(slot, ?overrides, "slot overrides applied");
        overrides
    }
}

impl std::fmt::Debug for SlotReadiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotReadiness")
            .field("state", &*self.state.lock())
            .finish()
    }
}
