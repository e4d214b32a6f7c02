//! Navigation: route rotation, the template invariant and route signals.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use mosaic_core::{AppDescriptor, AppKind, PageEvent, PageEventBus, Route};
use mosaic_router::RouteTable;
use tracing::{debug, error, info, warn};

use crate::errors::NavigationError;
use crate::guard::{GuardManager, Navigator};
use crate::routes::RouteState;
use crate::scheduler::LifecycleScheduler;

/// Owns the route pair and turns URLs into reroute cycles.
pub struct NavigationRouter {
    table: Arc<RouteTable>,
    routes: Arc<RouteState>,
    guards: Arc<GuardManager>,
    scheduler: Arc<dyn LifecycleScheduler>,
    bus: Arc<PageEventBus>,
    apps: IndexMap<String, AppDescriptor>,
}

impl NavigationRouter {
    /// Create a router.
    pub fn new(
        table: Arc<RouteTable>,
        routes: Arc<RouteState>,
        guards: Arc<GuardManager>,
        scheduler: Arc<dyn LifecycleScheduler>,
        bus: Arc<PageEventBus>,
        apps: IndexMap<String, AppDescriptor>,
    ) -> Self {
        Self {
            table,
            routes,
            guards,
            scheduler,
            bus,
            apps,
        }
    }

    /// The current route.
    pub fn current_route(&self) -> Arc<Route> {
        self.routes.current()
    }

    /// Run the initial cycle for the URL the page was served for.
    pub async fn start(&self, url: &str) -> Result<(), NavigationError> {
        let route = self.table.match_url(url)?;
        info!(url, route_id = %route.id, template = %route.template, "page started");
        self.routes.init(route);
        self.scheduler.reroute().await;
        Ok(())
    }

    /// Navigate to `url` if the guards allow it.
    ///
    /// Returns `Ok(false)` when a guard stopped or redirected the navigation.
    pub async fn navigate(&self, url: &str) -> Result<bool, NavigationError> {
        if !self.guards.should_navigate(url) {
            return Ok(false);
        }
        self.apply_url(url).await?;
        Ok(true)
    }

    /// Switch to `url` without consulting the guards.
    pub async fn apply_url(&self, url: &str) -> Result<(), NavigationError> {
        let route = self.table.match_url(url)?;
        self.commit(route).await
    }

    /// Whether `url` resolves to the current route.
    pub fn match_current_route(&self, url: &str) -> bool {
        match self.table.match_url(url) {
            Ok(route) => route.id == self.routes.current().id,
            Err(_) => false,
        }
    }

    /// Replace the current route with the special route `role`.
    ///
    /// Only the primary application of the page may do this. Returns whether
    /// the signal was honored.
    pub async fn handle_special_route(&self, app: &str, slot: &str, role: &str) -> Result<bool, NavigationError> {
        let current = self.routes.current();
        let descriptor_kind = self.apps.get(app).map(|d| d.kind).unwrap_or_default();
        let kind = current
            .slot(slot)
            .filter(|assignment| assignment.app == app)
            .map(|assignment| assignment.kind.unwrap_or(descriptor_kind));

        if kind != Some(AppKind::Primary) {
            warn!(app, slot, role, "special route ignored, signal not from the primary application");
            return Ok(false);
        }

        let route = self.table.match_special(&current.url, role)?;
        info!(app, role, url = %current.url, "switching to special route");
        self.commit(route).await?;
        Ok(true)
    }

    async fn commit(&self, route: Route) -> Result<(), NavigationError> {
        let current = self.routes.current();
        if !current.template.is_empty() && current.template != route.template {
            error!(from = %current.template, to = %route.template, url = %route.url, "template changed");
            return Err(NavigationError::TemplateChanged {
                from: current.template.clone(),
                to: route.template.clone(),
            });
        }

        let localizer = self.table.localizer();
        let locale = localizer.locale_of(&route.url);
        let locale_changed = !current.url.is_empty() && localizer.locale_of(&current.url) != locale;

        let url = route.url.clone();
        let route_id = route.id.clone();
        let replaced = self.routes.rotate(route);
        debug!(url = %url, route_id = %route_id, "route changed");

        self.bus.emit(PageEvent::RouteChanged {
            previous_url: Some(replaced.url.clone()).filter(|u| !u.is_empty()),
            url,
            route_id,
        });
        if let (true, Some(locale)) = (locale_changed, locale) {
            self.bus.emit(PageEvent::IntlChanged { locale });
        }

        self.scheduler.reroute().await;
        Ok(())
    }
}

#[async_trait]
impl Navigator for NavigationRouter {
    async fn navigate(&self, url: &str) {
        if let Err(err) = NavigationRouter::navigate(self, url).await {
            error!(url, error = %err, "redirect failed");
        }
    }
}

impl std::fmt::Debug for NavigationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationRouter")
            .field("current", &self.routes.current().id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::GuardAction;
    use crate::scheduler::Scheduler;
    use mosaic_core::{CollectingErrorSink, RouteDef, SlotAssignment};
    use mosaic_router::PrefixLocalizer;
    use parking_lot::Mutex;

    struct Fixture {
        router: NavigationRouter,
        guards: Arc<GuardManager>,
        routes: Arc<RouteState>,
        events: Arc<Mutex<Vec<PageEvent>>>,
    }

    fn table() -> RouteTable {
        let mut special = IndexMap::new();
        special.insert(
            "404".to_string(),
            RouteDef::new("not-found", "*")
                .with_template("master")
                .with_slot("body", SlotAssignment::new("error-page")),
        );
        RouteTable::new(
            vec![
                RouteDef::new("shared", "*")
                    .with_next(true)
                    .with_slot("navbar", SlotAssignment::new("navbar")),
                RouteDef::new("home", "/")
                    .with_template("master")
                    .with_slot("body", SlotAssignment::new("home")),
                RouteDef::new("news", "/news/*")
                    .with_template("master")
                    .with_slot("body", SlotAssignment::new("news").with_kind(AppKind::Primary)),
                RouteDef::new("checkout", "/checkout")
                    .with_template("checkout")
                    .with_slot("body", SlotAssignment::new("checkout")),
            ],
            special,
        )
        .unwrap()
        .with_localizer(Arc::new(PrefixLocalizer::new("en", &["en", "ua"])))
    }

    fn fixture() -> Fixture {
        let table = Arc::new(table());
        let bus = Arc::new(PageEventBus::new());
        let routes = Arc::new(RouteState::new());
        routes.attach(&bus);
        let guards = Arc::new(GuardManager::new(
            table.clone(),
            routes.clone(),
            Arc::new(CollectingErrorSink::new()),
        ));
        let scheduler = Scheduler::new(bus.clone());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe(move |event: &PageEvent| {
            if !matches!(event, PageEvent::BeforeRouting | PageEvent::AppChange) {
                sink.lock().push(event.clone());
            }
        });
        let router = NavigationRouter::new(table, routes.clone(), guards.clone(), scheduler, bus, IndexMap::new());
        Fixture {
            router,
            guards,
            routes,
            events,
        }
    }

    #[tokio::test]
    async fn test_start_does_not_signal_route_change() {
        let fx = fixture();

        fx.router.start("/").await.unwrap();

        assert_eq!(fx.router.current_route().id, "home");
        assert!(fx.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_navigate_rotates_and_signals() {
        let fx = fixture();
        fx.router.start("/").await.unwrap();

        assert!(fx.router.navigate("/news/42").await.unwrap());

        assert_eq!(fx.routes.previous().id, "home");
        assert_eq!(fx.routes.current().id, "news");
        assert_eq!(
            *fx.events.lock(),
            vec![PageEvent::RouteChanged {
                previous_url: Some("/".into()),
                url: "/news/42".into(),
                route_id: "news".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_template_change_is_fatal() {
        let fx = fixture();
        fx.router.start("/").await.unwrap();

        let err = fx.router.navigate("/checkout").await.unwrap_err();

        assert_eq!(
            err,
            NavigationError::TemplateChanged {
                from: "master".into(),
                to: "checkout".into(),
            }
        );
        assert_eq!(fx.router.current_route().id, "home");
        assert!(fx.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_guard_denial_keeps_route() {
        let fx = fixture();
        fx.router.start("/").await.unwrap();
        fx.guards.add_hook(|_| Ok(GuardAction::StopNavigation));

        assert!(!fx.router.navigate("/news/1").await.unwrap());
        assert_eq!(fx.router.current_route().id, "home");
    }

    #[tokio::test]
    async fn test_match_current_route() {
        let fx = fixture();
        fx.router.start("/news/1").await.unwrap();

        assert!(fx.router.match_current_route("/news/2?page=3"));
        assert!(!fx.router.match_current_route("/"));
    }

    #[tokio::test]
    async fn test_special_route_only_for_primary_units() {
        let fx = fixture();
        fx.router.start("/news/1").await.unwrap();

        assert!(!fx.router.handle_special_route("navbar", "navbar", "404").await.unwrap());
        assert_eq!(fx.router.current_route().id, "news");

        assert!(fx.router.handle_special_route("news", "body", "404").await.unwrap());
        let current = fx.router.current_route();
        assert_eq!(current.special_role.as_deref(), Some("404"));
        assert_eq!(current.slot("body").unwrap().app, "error-page");
        assert_eq!(current.slot("navbar").unwrap().app, "navbar");
    }

    #[tokio::test]
    async fn test_locale_change_is_signalled() {
        let fx = fixture();
        fx.router.start("/news/1").await.unwrap();

        fx.router.navigate("/ua/news/1").await.unwrap();

        let events = fx.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], PageEvent::IntlChanged { locale: "ua".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_performs_guard_redirects() {
        let fx = fixture();
        let router = Arc::new(fx.router);
        let navigator: Arc<dyn Navigator> = router.clone();
        fx.guards.set_navigator(Arc::downgrade(&navigator));
        fx.guards.add_hook(|context| {
            Ok(if context.url == "/news/secret" {
                GuardAction::Redirect("/news/public".into())
            } else {
                GuardAction::Continue
            })
        });
        router.start("/").await.unwrap();

        assert!(!router.navigate("/news/secret").await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(router.current_route().url, "/news/public");
    }
}
