//! Navigation guards.
//!
//! Hooks run in registration order against the route a URL resolves to.
//! The first hook that stops or redirects decides; a failing hook denies.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mosaic_core::{ErrorReport, ErrorSink, Settings, Severity, TrailingSlashPolicy};
use mosaic_router::{trailing_slash_redirect, RouteTable};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::routes::RouteState;

/// Outcome of a guard hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Continue,
    StopNavigation,
    Redirect(String),
}

/// What a hook gets to look at.
#[derive(Debug, Clone)]
pub struct GuardContext {
    /// Requested URL.
    pub url: String,
    /// Metadata of the route the URL resolves to.
    pub meta: Value,
    /// URL of the route being left, if any.
    pub previous_url: Option<String>,
}

/// Error type returned by hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A navigation guard hook.
pub type GuardHook = Arc<dyn Fn(&GuardContext) -> Result<GuardAction, HookError> + Send + Sync>;

/// A hook failed.
#[derive(Debug, thiserror::Error)]
#[error("Guard hook #{hook_index} failed for {url}: {source}")]
pub struct GuardError {
    pub hook_index: usize,
    pub url: String,
    #[source]
    pub source: HookError,
}

/// Performs navigations requested by guards.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `url`.
    async fn navigate(&self, url: &str);
}

/// Evaluates navigation guard hooks.
pub struct GuardManager {
    table: Arc<RouteTable>,
    routes: Arc<RouteState>,
    sink: Arc<dyn ErrorSink>,
    hooks: Mutex<Vec<GuardHook>>,
    navigator: Mutex<Option<Weak<dyn Navigator>>>,
}

impl GuardManager {
    /// Create a manager with no hooks.
    pub fn new(table: Arc<RouteTable>, routes: Arc<RouteState>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            table,
            routes,
            sink,
            hooks: Mutex::new(Vec::new()),
            navigator: Mutex::new(None),
        }
    }

    /// Create a manager with the built-in hooks `settings` ask for.
    pub fn from_settings(
        table: Arc<RouteTable>,
        routes: Arc<RouteState>,
        sink: Arc<dyn ErrorSink>,
        settings: &Settings,
    ) -> Self {
        let manager = Self::new(table, routes, sink);
        if settings.trailing_slash != TrailingSlashPolicy::DoNothing {
            manager.push_hook(trailing_slash_hook(settings.trailing_slash));
        }
        manager
    }

    /// Set who performs redirects.
    pub fn set_navigator(&self, navigator: Weak<dyn Navigator>) {
        *self.navigator.lock() = Some(navigator);
    }

    /// Append a hook.
    pub fn add_hook<F>(&self, hook: F)
    where
        F: Fn(&GuardContext) -> Result<GuardAction, HookError> + Send + Sync + 'static,
    {
        self.push_hook(Arc::new(hook));
    }

    /// Append a pre-built hook.
    pub fn push_hook(&self, hook: GuardHook) {
        self.hooks.lock().push(hook);
    }

    /// Number of hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Whether navigation to `url` may proceed.
    ///
    /// A redirect denies and navigates to the new location on a later tick.
    pub fn should_navigate(&self, url: &str) -> bool {
        match self.evaluate(url) {
            GuardAction::Continue => true,
            GuardAction::StopNavigation => {
                debug!(url, "navigation stopped by guard");
                false
            }
            GuardAction::Redirect(location) => {
                debug!(url, location = %location, "navigation redirected by guard");
                self.schedule_redirect(location);
                false
            }
        }
    }

    /// Whether `url` would be allowed. Never redirects.
    pub fn has_access_to(&self, url: &str) -> bool {
        self.evaluate(url) == GuardAction::Continue
    }

    /// Run the hooks for `url`.
    pub fn evaluate(&self, url: &str) -> GuardAction {
        let route = match self.table.match_url(url) {
            Ok(route) => route,
            Err(err) => {
                debug!(url, error = %err, "unmatched url, guards skipped");
                return GuardAction::Continue;
            }
        };
        if route.is_special() {
            return GuardAction::Continue;
        }

        let previous = self.routes.current();
        let context = GuardContext {
            url: url.to_string(),
            meta: route.meta,
            previous_url: Some(previous.url.clone()).filter(|u| !u.is_empty()),
        };

        let hooks = self.hooks.lock().clone();
        for (hook_index, hook) in hooks.iter().enumerate() {
            match hook(&context) {
                Ok(GuardAction::Continue) => {}
                Ok(action) => return action,
                Err(source) => {
                    let err = GuardError {
                        hook_index,
                        url: url.to_string(),
                        source,
                    };
                    self.report(&err);
                    return GuardAction::StopNavigation;
                }
            }
        }
        GuardAction::Continue
    }

    fn report(&self, err: &GuardError) {
        warn!(hook_index = err.hook_index, url = %err.url, error = %err.source, "guard hook failed");
        let report = ErrorReport::new("guard", err.to_string())
            .with_severity(Severity::NonCritical)
            .with_field("hook_index", err.hook_index)
            .with_field("url", &err.url);
        self.sink.report(&report);
    }

    fn schedule_redirect(&self, location: String) {
        let Some(navigator) = self.navigator.lock().clone() else {
            warn!(location = %location, "no navigator, redirect dropped");
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(location = %location, "no runtime, redirect dropped");
            return;
        };
        handle.spawn(async move {
            tokio::task::yield_now().await;
            if let Some(navigator) = navigator.upgrade() {
                navigator.navigate(&location).await;
            }
        });
    }
}

impl std::fmt::Debug for GuardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardManager")
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// Hook enforcing a trailing-slash policy.
pub fn trailing_slash_hook(policy: TrailingSlashPolicy) -> GuardHook {
    Arc::new(move |context: &GuardContext| {
        Ok(match trailing_slash_redirect(&context.url, policy) {
            Some(location) => GuardAction::Redirect(location),
            None => GuardAction::Continue,
        })
    })
}
