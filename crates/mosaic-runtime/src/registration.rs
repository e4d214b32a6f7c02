//! Registration of (application, slot) units with the scheduler.

use std::sync::Arc;

use futures::FutureExt;
use mosaic_core::{AppDescriptor, LifecycleCallbacks, RegistryConfig};
use mosaic_loader::{BundleLoader, LoadOptions};
use mosaic_transition::TransitionCoordinator;
use serde_json::Value;
use tracing::{debug, warn};

use crate::activation::ActivityEvaluator;
use crate::errors::{ErrorClassifier, UnitError};
use crate::readiness::SlotReadiness;
use crate::routes::RouteState;
use crate::scheduler::{unit_id, AppRegistration, LifecycleScheduler};
use crate::wrapper::WrappedApp;

/// Registers one scheduler unit per (application, slot) pair.
pub struct Registrar {
    routes: Arc<RouteState>,
    transitions: Arc<TransitionCoordinator>,
    scheduler: Arc<dyn LifecycleScheduler>,
    bundles: Arc<BundleLoader>,
    readiness: Arc<SlotReadiness>,
    classifier: Arc<ErrorClassifier>,
}

impl Registrar {
    /// Create a registrar.
    pub fn new(
        routes: Arc<RouteState>,
        transitions: Arc<TransitionCoordinator>,
        scheduler: Arc<dyn LifecycleScheduler>,
        bundles: Arc<BundleLoader>,
        readiness: Arc<SlotReadiness>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self {
            routes,
            transitions,
            scheduler,
            bundles,
            readiness,
            classifier,
        }
    }

    /// Register every pair any route or special route can produce.
    /// Returns the registered unit ids.
    pub fn register_all(&self, config: &RegistryConfig) -> Vec<String> {
        let mut ids = Vec::new();
        for (app, slot) in config.slot_pairs() {
            match config.app(&app) {
                Some(descriptor) => ids.push(self.register(descriptor.clone(), &slot)),
                None => warn!(app = %app, slot = %slot, "route references an unknown application"),
            }
        }
        debug!(units = ids.len(), "units registered");
        ids
    }

    /// Register `descriptor` in `slot`. Returns the unit id.
    pub fn register(&self, descriptor: AppDescriptor, slot: &str) -> String {
        let id = unit_id(&descriptor.name, slot);
        let registration = AppRegistration {
            id: id.clone(),
            app_name: descriptor.name.clone(),
            slot_name: slot.to_string(),
            loader: self.unit_loader(&descriptor, slot),
            activity: self.activity(&descriptor, slot),
            props: self.props(&descriptor, slot),
            error_handler: self.error_handler(&descriptor.name, slot),
        };
        self.scheduler.register_application(registration);
        id
    }

    fn unit_loader(&self, descriptor: &AppDescriptor, slot: &str) -> crate::scheduler::UnitLoader {
        let readiness = Arc::clone(&self.readiness);
        let bundles = Arc::clone(&self.bundles);
        let descriptor = descriptor.clone();
        let slot = slot.to_string();
        Arc::new(move || {
            let readiness = readiness.clone();
            let bundles = bundles.clone();
            let descriptor = descriptor.clone();
            let slot = slot.clone();
            async move { load_unit(&readiness, &bundles, descriptor, &slot).await }.boxed()
        })
    }

    fn activity(&self, descriptor: &AppDescriptor, slot: &str) -> crate::scheduler::ActivityFn {
        let evaluator = ActivityEvaluator::new(
            descriptor.clone(),
            slot,
            Arc::clone(&self.routes),
            Arc::clone(&self.transitions),
            Arc::downgrade(&self.scheduler),
        );
        Arc::new(move || evaluator.evaluate())
    }

    fn props(&self, descriptor: &AppDescriptor, slot: &str) -> crate::scheduler::PropsFn {
        let routes = Arc::clone(&self.routes);
        let descriptor = descriptor.clone();
        let slot = slot.to_string();
        Arc::new(move || {
            let (previous, current) = routes.snapshot();
            current
                .merged_props(&descriptor, &slot)
                .or_else(|| previous.merged_props(&descriptor, &slot))
                .unwrap_or_else(|| descriptor.props.clone())
        })
    }

    fn error_handler(&self, app: &str, slot: &str) -> crate::scheduler::ErrorHandler {
        let classifier = Arc::clone(&self.classifier);
        let app = app.to_string();
        let slot = slot.to_string();
        Arc::new(move |err: &UnitError| {
            classifier.handle(&app, &slot, err);
        })
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar").finish_non_exhaustive()
    }
}

async fn load_unit(
    readiness: &SlotReadiness,
    bundles: &BundleLoader,
    mut descriptor: AppDescriptor,
    slot: &str,
) -> Result<LifecycleCallbacks, UnitError> {
    let overrides = readiness.wait_for_slot(slot).await;
    overrides.apply_to(&mut descriptor);

    let callbacks = bundles.load_descriptor(&descriptor, LoadOptions::default()).await?;
    let Some(wrapper_name) = descriptor.wrapped_with.as_deref() else {
        return Ok(callbacks);
    };

    let wrapper = bundles.descriptor(wrapper_name)?.clone();
    let wrapper_callbacks = bundles.load_descriptor(&wrapper, LoadOptions::default()).await?;
    debug!(app = %descriptor.name, wrapper = %wrapper.name, slot, "wrapped application");

    Ok(WrappedApp::new(wrapper_callbacks, callbacks)
        .with_wrapped_rendered(overrides.wrapped_rendered)
        .with_wrapper_props(overrides.wrapper_props.unwrap_or(Value::Null))
        .callbacks())
}
