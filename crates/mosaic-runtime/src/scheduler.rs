//! Lifecycle scheduling.
//!
//! A scheduler owns the registered units and runs reroute cycles: emit
//! `BeforeRouting`, evaluate every activity function, unmount the units that
//! became inactive, load and mount the ones that became active, then emit
//! `AppChange`. Cycles never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use indexmap::IndexMap;
use mosaic_core::{
    LifecycleCallbacks, LifecyclePhase, LifecycleState, MountProps, PageEvent, PageEventBus,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::UnitError;

/// Separator between application and slot in a unit id.
pub const UNIT_SEPARATOR: &str = "__at__";

/// Id of the unit hosting `app` in `slot`.
pub fn unit_id(app: &str, slot: &str) -> String {
    format!("{}{}{}", app, UNIT_SEPARATOR, slot)
}

/// Split a unit id into application and slot.
pub fn parse_unit_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(UNIT_SEPARATOR)
}

/// Loads the callbacks of a unit.
pub type UnitLoader = Arc<dyn Fn() -> BoxFuture<'static, Result<LifecycleCallbacks, UnitError>> + Send + Sync>;

/// Whether a unit should be mounted right now.
pub type ActivityFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Props a unit mounts with right now.
pub type PropsFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Receives unit failures.
pub type ErrorHandler = Arc<dyn Fn(&UnitError) + Send + Sync>;

/// Everything a scheduler needs to drive one unit.
#[derive(Clone)]
pub struct AppRegistration {
    /// Unit id, `app__at__slot`.
    pub id: String,
    /// Application name.
    pub app_name: String,
    /// Slot name.
    pub slot_name: String,
    /// Loads the callbacks.
    pub loader: UnitLoader,
    /// Activity predicate.
    pub activity: ActivityFn,
    /// Current merged props.
    pub props: PropsFn,
    /// Failure handler.
    pub error_handler: ErrorHandler,
}

impl AppRegistration {
    /// Mount props as of now.
    pub fn mount_props(&self) -> MountProps {
        MountProps::new(self.app_name.clone(), self.slot_name.clone()).with_props((self.props)())
    }
}

impl std::fmt::Debug for AppRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistration")
            .field("id", &self.id)
            .field("app_name", &self.app_name)
            .field("slot_name", &self.slot_name)
            .finish()
    }
}

/// Mount/unmount lifecycle scheduler.
#[async_trait]
pub trait LifecycleScheduler: Send + Sync {
    /// Register a unit. Registering an id twice replaces nothing.
    fn register_application(&self, registration: AppRegistration);

    /// Ask for another cycle once the pending one completes.
    fn request_reroute(&self);

    /// Run a reroute cycle, plus any cycles requested while it ran.
    async fn reroute(&self);
}

struct Unit {
    registration: AppRegistration,
    state: LifecycleState,
    callbacks: Option<LifecycleCallbacks>,
}

/// Reference scheduler.
pub struct Scheduler {
    bus: Arc<PageEventBus>,
    units: Mutex<IndexMap<String, Unit>>,
    cycle: tokio::sync::Mutex<()>,
    reroute_requested: AtomicBool,
    this: Weak<Self>,
}

impl Scheduler {
    /// Create a scheduler emitting routing signals on `bus`.
    pub fn new(bus: Arc<PageEventBus>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            bus,
            units: Mutex::new(IndexMap::new()),
            cycle: tokio::sync::Mutex::new(()),
            reroute_requested: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// Lifecycle state of a unit.
    pub fn state_of(&self, id: &str) -> Option<LifecycleState> {
        self.units.lock().get(id).map(|u| u.state)
    }

    /// Ids of the mounted units, in registration order.
    pub fn mounted_units(&self) -> Vec<String> {
        self.units
            .lock()
            .iter()
            .filter(|(_, u)| u.state == LifecycleState::Mounted)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of every registered unit, in registration order.
    pub fn unit_ids(&self) -> Vec<String> {
        self.units.lock().keys().cloned().collect()
    }

    async fn drain(&self) {
        let _cycle = self.cycle.lock().await;
        while self.reroute_requested.swap(false, Ordering::SeqCst) {
            self.run_cycle().await;
        }
    }

    async fn run_cycle(&self) {
        self.bus.emit(PageEvent::BeforeRouting);

        let candidates: Vec<(String, ActivityFn, LifecycleState)> = self
            .units
            .lock()
            .iter()
            .map(|(id, u)| (id.clone(), u.registration.activity.clone(), u.state))
            .collect();

        let mut to_unmount = Vec::new();
        let mut to_mount = Vec::new();
        for (id, activity, state) in candidates {
            let active = activity();
            match (active, state) {
                (false, LifecycleState::Mounted) => to_unmount.push(id),
                (true, LifecycleState::Mounted) | (true, LifecycleState::Broken) => {}
                (true, _) => to_mount.push(id),
                (false, _) => {}
            }
        }

        debug!(unmount = ?to_unmount, mount = ?to_mount, "reroute cycle");
        join_all(to_unmount.iter().map(|id| self.unmount_unit(id))).await;
        join_all(to_mount.iter().map(|id| self.mount_unit(id))).await;

        self.bus.emit(PageEvent::AppChange);
    }

    fn unit_parts(&self, id: &str) -> Option<(AppRegistration, LifecycleState, Option<LifecycleCallbacks>)> {
        self.units
            .lock()
            .get(id)
            .map(|u| (u.registration.clone(), u.state, u.callbacks.clone()))
    }

    fn set_state(&self, id: &str, state: LifecycleState) {
        if let Some(unit) = self.units.lock().get_mut(id) {
            unit.state = state;
        }
    }

    fn fail(&self, registration: &AppRegistration, err: UnitError) {
        self.set_state(&registration.id, LifecycleState::Broken);
        (registration.error_handler)(&err);
    }

    async fn unmount_unit(&self, id: &str) {
        let Some((registration, _, Some(callbacks))) = self.unit_parts(id) else {
            return;
        };

        match callbacks.unmount.run(registration.mount_props()).await {
            Ok(()) => {
                self.set_state(id, LifecycleState::Unmounted);
                debug!(unit = id, "unmounted");
            }
            Err(err) => self.fail(&registration, err.in_phase(id, LifecyclePhase::Unmount).into()),
        }
    }

    async fn mount_unit(&self, id: &str) {
        let Some((registration, mut state, callbacks)) = self.unit_parts(id) else {
            return;
        };

        let callbacks = match callbacks {
            Some(callbacks) => callbacks,
            None => match (registration.loader)().await {
                Ok(callbacks) => {
                    if let Some(unit) = self.units.lock().get_mut(id) {
                        unit.callbacks = Some(callbacks.clone());
                        unit.state = LifecycleState::Loaded;
                    }
                    state = LifecycleState::Loaded;
                    callbacks
                }
                Err(err) => return self.fail(&registration, err),
            },
        };

        if !state.is_bootstrapped() {
            if let Err(err) = callbacks.bootstrap.run(registration.mount_props()).await {
                return self.fail(&registration, err.in_phase(id, LifecyclePhase::Bootstrap).into());
            }
            self.set_state(id, LifecycleState::Bootstrapped);
        }

        match callbacks.mount.run(registration.mount_props()).await {
            Ok(()) => {
                self.set_state(id, LifecycleState::Mounted);
                debug!(unit = id, "mounted");
            }
            Err(err) => self.fail(&registration, err.in_phase(id, LifecyclePhase::Mount).into()),
        }
    }
}

#[async_trait]
impl LifecycleScheduler for Scheduler {
    fn register_application(&self, registration: AppRegistration) {
        let mut units = self.units.lock();
        if units.contains_key(&registration.id) {
            return;
        }
        debug!(unit = %registration.id, "unit registered");
        units.insert(
            registration.id.clone(),
            Unit {
                registration,
                state: LifecycleState::NotLoaded,
                callbacks: None,
            },
        );
    }

    fn request_reroute(&self) {
        self.reroute_requested.store(true, Ordering::SeqCst);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let this = self.this.clone();
            handle.spawn(async move {
                if let Some(scheduler) = this.upgrade() {
                    scheduler.drain().await;
                }
            });
        }
    }

    async fn reroute(&self) {
        let _cycle = self.cycle.lock().await;
        loop {
            self.run_cycle().await;
            if !self.reroute_requested.swap(false, Ordering::SeqCst) {
                break;
            }
            info!("running requested reroute cycle");
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("units", &self.units.lock().len())
            .finish()
    }
}
