//! Per-slot activation decisions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use mosaic_core::{props_equal, AppDescriptor};
use mosaic_transition::{SlotEffect, TransitionCoordinator, TransitionError};
use tracing::{debug, error, info, warn};

use crate::routes::RouteState;
use crate::scheduler::LifecycleScheduler;

/// Decides whether one application should currently be mounted in one slot.
///
/// Evaluated by the scheduler at every reroute cycle. Besides the answer it
/// tells the transition coordinator what the cycle is about to do to the slot.
/// When the application stays in its slot but its merged props change, the
/// unit is reported inactive once so the cycle unmounts it, and a follow-up
/// cycle mounts it again with the new props.
pub struct ActivityEvaluator {
    app: String,
    slot: String,
    descriptor: AppDescriptor,
    routes: Arc<RouteState>,
    transitions: Arc<TransitionCoordinator>,
    scheduler: Weak<dyn LifecycleScheduler>,
    reload: AtomicBool,
}

impl ActivityEvaluator {
    /// Create an evaluator for `descriptor` in `slot`.
    pub fn new(
        descriptor: AppDescriptor,
        slot: impl Into<String>,
        routes: Arc<RouteState>,
        transitions: Arc<TransitionCoordinator>,
        scheduler: Weak<dyn LifecycleScheduler>,
    ) -> Self {
        Self {
            app: descriptor.name.clone(),
            slot: slot.into(),
            descriptor,
            routes,
            transitions,
            scheduler,
            reload: AtomicBool::new(false),
        }
    }

    /// Application name.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Slot name.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Whether the unit should be mounted now.
    pub fn evaluate(&self) -> bool {
        let (previous, current) = self.routes.snapshot();
        let is_active = current.assigns(&self.app, &self.slot);
        let was_active = previous.assigns(&self.app, &self.slot);
        let reload = self.reload.swap(false, Ordering::SeqCst);

        let effect = match (is_active, was_active) {
            (true, false) => SlotEffect::Rendered,
            (false, true) => SlotEffect::Removed,
            (true, true) if !reload => {
                let before = previous.merged_props(&self.descriptor, &self.slot);
                let after = current.merged_props(&self.descriptor, &self.slot);
                let changed = match (&before, &after) {
                    (Some(before), Some(after)) => !props_equal(before, after),
                    _ => false,
                };
                if changed {
                    self.signal(SlotEffect::Rerendered);
                    self.schedule_remount();
                    return false;
                }
                SlotEffect::Default
            }
            _ => SlotEffect::Default,
        };

        self.signal(effect);
        is_active
    }

    fn schedule_remount(&self) {
        self.reload.store(true, Ordering::SeqCst);
        match self.scheduler.upgrade() {
            Some(scheduler) => {
                info!(app = %self.app, slot = %self.slot, "props changed, forced remount");
                scheduler.request_reroute();
            }
            None => warn!(app = %self.app, slot = %self.slot, "scheduler gone, remount dropped"),
        }
    }

    fn signal(&self, effect: SlotEffect) {
        if effect == SlotEffect::Default {
            return;
        }
        debug!(app = %self.app, slot = %self.slot, %effect, "slot effect");
        match self.transitions.handle_page_transaction(&self.slot, effect) {
            Ok(()) => {}
            Err(TransitionError::SlotNotFound(slot)) => {
                warn!(app = %self.app, slot = %slot, "slot element missing, no transition")
            }
            Err(err) => error!(app = %self.app, error = %err, "page transaction rejected"),
        }
    }
}

impl std::fmt::Debug for ActivityEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityEvaluator")
            .field("app", &self.app)
            .field("slot", &self.slot)
            .field("reload", &self.reload.load(Ordering::SeqCst))
            .finish()
    }
}
