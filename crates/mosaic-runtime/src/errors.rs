//! Runtime error types and error classification.

use std::sync::Arc;

use indexmap::IndexMap;
use mosaic_core::{
    AppDescriptor, AppKind, ConfigError, ErrorReport, ErrorSink, LifecycleError, Route, Severity,
};
use mosaic_loader::LoadError;
use mosaic_router::RouterError;
use tracing::{error, warn};

use crate::routes::RouteState;

/// Failure of a scheduled unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Error type for navigation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    /// The page template cannot change within one page view.
    #[error("Template changed from '{from}' to '{to}'; a full page load is required")]
    TemplateChanged { from: String, to: String },

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Error type for building a page context.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Route table error: {0}")]
    Router(#[from] RouterError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),
}

/// Decides how severe a unit failure is and reports it.
///
/// The kind of the failing application decides: taken from its assignment in
/// the current route, then the previous route, then its descriptor.
/// `primary` and `essential` failures are critical and escalate.
pub struct ErrorClassifier {
    routes: Arc<RouteState>,
    apps: IndexMap<String, AppDescriptor>,
    sink: Arc<dyn ErrorSink>,
}

impl ErrorClassifier {
    /// Create a classifier.
    pub fn new(routes: Arc<RouteState>, apps: IndexMap<String, AppDescriptor>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { routes, apps, sink }
    }

    /// Kind of `app` while rendered in `slot`.
    pub fn kind_of(&self, app: &str, slot: &str) -> AppKind {
        let descriptor_kind = self.apps.get(app).map(|d| d.kind).unwrap_or_default();
        let from_route = |route: &Route| {
            route
                .slot(slot)
                .filter(|assignment| assignment.app == app)
                .map(|assignment| assignment.kind.unwrap_or(descriptor_kind))
        };

        let (previous, current) = self.routes.snapshot();
        from_route(&current)
            .or_else(|| from_route(&previous))
            .unwrap_or(descriptor_kind)
    }

    /// Report a failure of `app` in `slot`. Returns its severity.
    pub fn handle(&self, app: &str, slot: &str, err: &UnitError) -> Severity {
        let kind = self.kind_of(app, slot);
        let severity = if kind.is_critical() {
            Severity::Critical
        } else {
            Severity::NonCritical
        };

        let report = ErrorReport::new("lifecycle", err.to_string())
            .with_severity(severity)
            .with_app(app)
            .with_slot(slot)
            .with_field("kind", kind);
        self.sink.report(&report);

        if severity == Severity::Critical {
            error!(app, slot, %kind, error = %err, "critical fragment failure");
            self.sink.escalate(&report);
        } else {
            warn!(app, slot, %kind, error = %err, "fragment failed, slot left empty");
        }
        severity
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("apps", &self.apps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{CollectingErrorSink, SlotAssignment};

    fn apps() -> IndexMap<String, AppDescriptor> {
        let mut apps = IndexMap::new();
        apps.insert("navbar".to_string(), AppDescriptor::new("navbar"));
        apps.insert(
            "shell".to_string(),
            AppDescriptor::new("shell").with_kind(AppKind::Essential),
        );
        apps
    }

    fn route(slot: &str, assignment: SlotAssignment) -> Route {
        let mut route = Route::default();
        route.slots.insert(slot.to_string(), assignment);
        route
    }

    fn classifier(sink: Arc<CollectingErrorSink>) -> (Arc<RouteState>, ErrorClassifier) {
        let routes = Arc::new(RouteState::new());
        let classifier = ErrorClassifier::new(routes.clone(), apps(), sink);
        (routes, classifier)
    }

    fn failure() -> UnitError {
        UnitError::Lifecycle(LifecycleError::failed("boom"))
    }

    #[test]
    fn test_kind_from_current_route_wins() {
        let (routes, classifier) = classifier(Arc::new(CollectingErrorSink::new()));
        routes.init(route(
            "body",
            SlotAssignment::new("navbar").with_kind(AppKind::Primary),
        ));

        assert_eq!(classifier.kind_of("navbar", "body"), AppKind::Primary);
    }

    #[test]
    fn test_kind_falls_back_to_previous_route() {
        let (routes, classifier) = classifier(Arc::new(CollectingErrorSink::new()));
        routes.init(route(
            "body",
            SlotAssignment::new("navbar").with_kind(AppKind::Primary),
        ));
        routes.rotate(Route::default());

        assert_eq!(classifier.kind_of("navbar", "body"), AppKind::Primary);
    }

    #[test]
    fn test_kind_falls_back_to_descriptor() {
        let (_, classifier) = classifier(Arc::new(CollectingErrorSink::new()));

        assert_eq!(classifier.kind_of("shell", "header"), AppKind::Essential);
        assert_eq!(classifier.kind_of("ghost", "header"), AppKind::Regular);
    }

    #[test]
    fn test_regular_failure_is_reported_only() {
        let sink = Arc::new(CollectingErrorSink::new());
        let (_, classifier) = classifier(sink.clone());

        let severity = classifier.handle("navbar", "navbar", &failure());

        assert_eq!(severity, Severity::NonCritical);
        assert_eq!(sink.reports().len(), 1);
        assert!(sink.escalated().is_empty());
        assert_eq!(sink.reports()[0].field("kind"), Some("regular"));
    }

    #[test]
    fn test_essential_failure_escalates() {
        let sink = Arc::new(CollectingErrorSink::new());
        let (_, classifier) = classifier(sink.clone());

        let severity = classifier.handle("shell", "header", &failure());

        assert_eq!(severity, Severity::Critical);
        assert_eq!(sink.escalated().len(), 1);
        assert_eq!(sink.escalated()[0].app.as_deref(), Some("shell"));
    }

    #[test]
    fn test_template_change_message() {
        let err = NavigationError::TemplateChanged {
            from: "master".into(),
            to: "checkout".into(),
        };
        assert!(err.to_string().contains("'master' to 'checkout'"));
    }
}
