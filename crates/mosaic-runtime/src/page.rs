//! The page context: one instance per page view.

use std::future::Future;
use std::sync::Arc;

use mosaic_core::{
    CollectingErrorSink, ErrorSink, LifecycleCallbacks, LifecycleState, MemorySurface, PageEvent, PageEventBus,
    RegistryConfig, RenderSurface, Route, SubscriptionId,
};
use mosaic_loader::{BundleLoader, CssTracker, LoadError, ModuleLoader, StaticModuleLoader};
use mosaic_router::{RouteTable, UrlLocalizer};
use mosaic_transition::{BlockerId, TransitionCoordinator};
use tracing::info;

use crate::errors::{ErrorClassifier, NavigationError, RuntimeError};
use crate::guard::{GuardAction, GuardContext, GuardManager, HookError, Navigator};
use crate::navigation::NavigationRouter;
use crate::readiness::SlotReadiness;
use crate::registration::Registrar;
use crate::routes::RouteState;
use crate::scheduler::{unit_id, Scheduler};

/// A committed route change, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub previous_url: Option<String>,
    pub url: String,
    pub route_id: String,
}

/// Builder for [`PageContext`].
pub struct PageContextBuilder {
    config: RegistryConfig,
    surface: Option<Arc<dyn RenderSurface>>,
    modules: Option<Arc<dyn ModuleLoader>>,
    sink: Option<Arc<dyn ErrorSink>>,
    localizer: Option<Arc<dyn UrlLocalizer>>,
}

impl PageContextBuilder {
    /// Set the rendering surface. Defaults to an empty [`MemorySurface`].
    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Set the module-loading substrate. Defaults to an empty [`StaticModuleLoader`].
    pub fn with_modules(mut self, modules: Arc<dyn ModuleLoader>) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Set where classified errors go. Defaults to a [`CollectingErrorSink`].
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the URL localizer derived from the i18n settings.
    pub fn with_localizer(mut self, localizer: Arc<dyn UrlLocalizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    /// Validate the registry and wire every component.
    pub fn build(self) -> Result<PageContext, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let surface = self.surface.unwrap_or_else(|| Arc::new(MemorySurface::new()));
        let modules = self.modules.unwrap_or_else(|| Arc::new(StaticModuleLoader::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(CollectingErrorSink::new()));

        let mut table = RouteTable::from_registry(&config)?;
        if let Some(localizer) = self.localizer {
            table = table.with_localizer(localizer);
        }
        let table = Arc::new(table);

        let bus = Arc::new(PageEventBus::new());
        let routes = Arc::new(RouteState::new());
        routes.attach(&bus);

        let transitions = TransitionCoordinator::new(surface.clone(), bus.clone(), config.settings.spinner.clone());
        let css = Arc::new(CssTracker::new(surface.clone(), &config.settings.css));
        css.attach(&bus);
        let bundles = Arc::new(BundleLoader::from_registry(&config, modules.clone(), css.clone()));
        let readiness = Arc::new(SlotReadiness::new(surface.clone(), modules));
        readiness.attach(&bus);

        let scheduler = Scheduler::new(bus.clone());
        let classifier = Arc::new(ErrorClassifier::new(routes.clone(), config.apps.clone(), sink.clone()));

        let guards = Arc::new(GuardManager::from_settings(
            table.clone(),
            routes.clone(),
            sink,
            &config.settings,
        ));
        let router = Arc::new(NavigationRouter::new(
            table.clone(),
            routes.clone(),
            guards.clone(),
            scheduler.clone(),
            bus.clone(),
            config.apps.clone(),
        ));
        let navigator: Arc<dyn Navigator> = router.clone();
        guards.set_navigator(Arc::downgrade(&navigator));

        let registrar = Registrar::new(
            routes.clone(),
            transitions.clone(),
            scheduler.clone(),
            bundles.clone(),
            readiness.clone(),
            classifier,
        );
        let units = registrar.register_all(&config);
        info!(
            apps = config.apps.len(),
            routes = config.routes.len(),
            units = units.len(),
            "page context ready"
        );

        Ok(PageContext {
            config,
            surface,
            bus,
            table,
            routes,
            transitions,
            css,
            bundles,
            readiness,
            scheduler,
            guards,
            router,
            units,
        })
    }
}

impl std::fmt::Debug for PageContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContextBuilder")
            .field("apps", &self.config.apps.len())
            .field("surface", &self.surface.is_some())
            .field("modules", &self.modules.is_some())
            .finish()
    }
}

/// Everything living on one page view.
///
/// Owns the components and exposes the page-level operations.
pub struct PageContext {
    config: RegistryConfig,
    surface: Arc<dyn RenderSurface>,
    bus: Arc<PageEventBus>,
    table: Arc<RouteTable>,
    routes: Arc<RouteState>,
    transitions: Arc<TransitionCoordinator>,
    css: Arc<CssTracker>,
    bundles: Arc<BundleLoader>,
    readiness: Arc<SlotReadiness>,
    scheduler: Arc<Scheduler>,
    guards: Arc<GuardManager>,
    router: Arc<NavigationRouter>,
    units: Vec<String>,
}

impl PageContext {
    /// Start building a context for `config`.
    pub fn builder(config: RegistryConfig) -> PageContextBuilder {
        PageContextBuilder {
            config,
            surface: None,
            modules: None,
            sink: None,
            localizer: None,
        }
    }

    /// Run the initial cycle for the URL the page was served for.
    ///
    /// Every slot of the initial route counts as discovered.
    pub async fn start(&self, url: &str) -> Result<(), NavigationError> {
        let route = self.table.match_url(url)?;
        for slot in route.slots.keys() {
            self.readiness.mark_slot_ready(slot);
        }
        self.router.start(url).await
    }

    /// Navigate to `url`. Returns `Ok(false)` when a guard intervened.
    pub async fn navigate(&self, url: &str) -> Result<bool, NavigationError> {
        self.router.navigate(url).await
    }

    /// Whether `url` resolves to the current route.
    pub fn match_current_route(&self, url: &str) -> bool {
        self.router.match_current_route(url)
    }

    /// Not-found (or other special role) signal from an application.
    pub async fn handle_special_route(&self, app: &str, slot: &str, role: &str) -> Result<bool, NavigationError> {
        self.router.handle_special_route(app, slot, role).await
    }

    /// The current route.
    pub fn current_route(&self) -> Arc<Route> {
        self.routes.current()
    }

    /// Load an application's callbacks, inserting its stylesheet in parallel.
    pub async fn load_app(&self, name: &str) -> Result<LifecycleCallbacks, LoadError> {
        self.bundles.load_app_with_css(name).await
    }

    /// Warm the module cache for an application.
    pub async fn preload_app(&self, name: &str) {
        self.bundles.preload_app(name).await
    }

    /// Subscribe to committed route changes.
    pub fn on_route_change<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&RouteChange) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let PageEvent::RouteChanged {
                previous_url,
                url,
                route_id,
            } = event
            {
                listener(&RouteChange {
                    previous_url: previous_url.clone(),
                    url: url.clone(),
                    route_id: route_id.clone(),
                });
            }
        })
    }

    /// Subscribe to locale changes.
    pub fn on_intl_change<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let PageEvent::IntlChanged { locale } = event {
                listener(locale);
            }
        })
    }

    /// Drop a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Report a server-rendered slot as discovered.
    pub fn mark_slot_ready(&self, slot: &str) {
        self.readiness.mark_slot_ready(slot);
    }

    /// Append a navigation guard hook.
    pub fn add_guard_hook<F>(&self, hook: F)
    where
        F: Fn(&GuardContext) -> Result<GuardAction, HookError> + Send + Sync + 'static,
    {
        self.guards.add_hook(hook);
    }

    /// Whether the guards would allow `url`.
    pub fn has_access_to(&self, url: &str) -> bool {
        self.guards.has_access_to(url)
    }

    /// Hold the current transition open until `action` completes.
    pub fn handle_async_action<F>(&self, action: F) -> BlockerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.transitions.handle_async_action(action)
    }

    /// Lifecycle state of `app` in `slot`.
    pub fn state_of(&self, app: &str, slot: &str) -> Option<LifecycleState> {
        self.scheduler.state_of(&unit_id(app, slot))
    }

    /// Ids of the registered units.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// The registry the page was built from.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The rendering surface.
    pub fn surface(&self) -> &Arc<dyn RenderSurface> {
        &self.surface
    }

    /// The page event bus.
    pub fn bus(&self) -> &Arc<PageEventBus> {
        &self.bus
    }

    /// The compiled route table.
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// The lifecycle scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The transition coordinator.
    pub fn transitions(&self) -> &Arc<TransitionCoordinator> {
        &self.transitions
    }

    /// The bundle loader.
    pub fn bundles(&self) -> &Arc<BundleLoader> {
        &self.bundles
    }

    /// The stylesheet tracker.
    pub fn css(&self) -> &Arc<CssTracker> {
        &self.css
    }

    /// The navigation guards.
    pub fn guards(&self) -> &Arc<GuardManager> {
        &self.guards
    }
}

impl std::fmt::Debug for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContext")
            .field("units", &self.units)
            .field("current", &self.routes.current().id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{
        AppDescriptor, AppKind, LifecycleError, LifecycleStage, MountProps, NodeId, RouteDef, Settings,
        SlotAssignment, TrailingSlashPolicy,
    };
    use mosaic_loader::ModuleExport;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    /// A fragment that renders its name into its slot and logs every step.
    fn fragment(name: &'static str, surface: &Arc<MemorySurface>, log: &Log) -> ModuleExport {
        let surface = surface.clone();
        let log = log.clone();
        ModuleExport::factory(move |_| {
            let bootstrap = {
                let log = log.clone();
                LifecycleStage::from_fn(move |props: MountProps| {
                    let log = log.clone();
                    async move {
                        log.lock().push(format!("bootstrap {} {}", name, props.props));
                        Ok(())
                    }
                })
            };
            let mount = {
                let log = log.clone();
                let surface = surface.clone();
                LifecycleStage::from_fn(move |props: MountProps| {
                    let log = log.clone();
                    let surface = surface.clone();
                    async move {
                        log.lock().push(format!("mount {} {}", name, props.props));
                        let slot = slot_node(&surface, &props.slot_name)?;
                        surface.append_text(slot, name);
                        Ok(())
                    }
                })
            };
            let unmount = {
                let log = log.clone();
                let surface = surface.clone();
                LifecycleStage::from_fn(move |props: MountProps| {
                    let log = log.clone();
                    let surface = surface.clone();
                    async move {
                        log.lock().push(format!("unmount {} {}", name, props.props));
                        let slot = slot_node(&surface, &props.slot_name)?;
                        surface.clear_children(slot);
                        Ok(())
                    }
                })
            };
            LifecycleCallbacks::new(bootstrap, mount, unmount)
        })
    }

    fn slot_node(surface: &MemorySurface, slot: &str) -> Result<NodeId, LifecycleError> {
        surface
            .slot_element(slot)
            .ok_or_else(|| LifecycleError::failed(format!("no slot {}", slot)))
    }

    fn failing() -> ModuleExport {
        ModuleExport::direct(LifecycleCallbacks::new(
            LifecycleStage::new(),
            LifecycleStage::from_fn(|_| async { Err(LifecycleError::failed("render crashed")) }),
            LifecycleStage::new(),
        ))
    }

    fn registry() -> RegistryConfig {
        RegistryConfig::new()
            .with_app(AppDescriptor::new("navbar").with_spa_bundle("/navbar.js"))
            .with_app(
                AppDescriptor::new("home")
                    .with_spa_bundle("/home.js")
                    .with_css_bundle("/home.css")
                    .with_kind(AppKind::Primary),
            )
            .with_app(AppDescriptor::new("news").with_spa_bundle("/news.js").with_kind(AppKind::Primary))
            .with_app(AppDescriptor::new("broken").with_spa_bundle("/broken.js").with_kind(AppKind::Primary))
            .with_app(AppDescriptor::new("checkout").with_spa_bundle("/checkout.js"))
            .with_route(
                RouteDef::new("home", "/")
                    .with_template("master")
                    .with_slot("navbar", SlotAssignment::new("navbar").with_props(json!({"x": 1})))
                    .with_slot("body", SlotAssignment::new("home")),
            )
            .with_route(
                RouteDef::new("news", "/news/*")
                    .with_template("master")
                    .with_slot("navbar", SlotAssignment::new("navbar").with_props(json!({"x": 2})))
                    .with_slot("body", SlotAssignment::new("news")),
            )
            .with_route(
                RouteDef::new("broken", "/broken")
                    .with_template("master")
                    .with_slot("navbar", SlotAssignment::new("navbar").with_props(json!({"x": 1})))
                    .with_slot("body", SlotAssignment::new("broken")),
            )
            .with_route(
                RouteDef::new("checkout", "/checkout")
                    .with_template("checkout")
                    .with_slot("body", SlotAssignment::new("checkout")),
            )
    }

    struct Fixture {
        surface: Arc<MemorySurface>,
        sink: Arc<CollectingErrorSink>,
        page: PageContext,
        log: Log,
    }

    fn fixture(config: RegistryConfig) -> Fixture {
        let log: Log = Arc::default();
        let surface = Arc::new(MemorySurface::new());
        surface.add_slot("navbar");
        surface.add_slot("body");
        let modules = StaticModuleLoader::new()
            .with_module("/navbar.js", fragment("navbar", &surface, &log))
            .with_module("/home.js", fragment("home", &surface, &log))
            .with_module("/news.js", fragment("news", &surface, &log))
            .with_module("/checkout.js", fragment("checkout", &surface, &log))
            .with_module("/broken.js", failing());
        let sink = Arc::new(CollectingErrorSink::new());
        let page = PageContext::builder(config)
            .with_surface(surface.clone())
            .with_modules(Arc::new(modules))
            .with_error_sink(sink.clone())
            .build()
            .unwrap();
        Fixture {
            surface,
            sink,
            page,
            log,
        }
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn take_log(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock())
    }

    // === Setup Tests ===

    #[test]
    fn test_build_registers_units() {
        let fx = fixture(registry());

        assert_eq!(
            fx.page.units(),
            &[
                "navbar__at__navbar".to_string(),
                "home__at__body".to_string(),
                "news__at__body".to_string(),
                "broken__at__body".to_string(),
                "checkout__at__body".to_string(),
            ]
        );
    }

    #[test]
    fn test_build_rejects_unknown_app() {
        let config = registry().with_route(
            RouteDef::new("ghost", "/ghost")
                .with_template("master")
                .with_slot("body", SlotAssignment::new("ghost")),
        );

        let err = PageContext::builder(config).build().unwrap_err();

        assert!(matches!(err, RuntimeError::Config(_)));
    }

    // === Navigation Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_start_mounts_initial_route() {
        let fx = fixture(registry());

        fx.page.start("/").await.unwrap();

        assert_eq!(
            take_log(&fx.log),
            vec![
                r#"bootstrap navbar {"x":1}"#,
                r#"mount navbar {"x":1}"#,
                r#"bootstrap home null"#,
                r#"mount home null"#,
            ]
        );
        assert_eq!(fx.page.state_of("home", "body"), Some(LifecycleState::Mounted));
        assert_eq!(fx.surface.stylesheet_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_swaps_body_and_remounts_changed_props() {
        let fx = fixture(registry());
        fx.page.start("/").await.unwrap();
        take_log(&fx.log);
        let settled = Arc::new(Mutex::new(0));
        let counter = settled.clone();
        fx.page.bus().subscribe(move |event| {
            if *event == PageEvent::SlotsSettled {
                *counter.lock() += 1;
            }
        });

        assert!(fx.page.navigate("/news/1").await.unwrap());
        tick().await;

        assert_eq!(
            take_log(&fx.log),
            vec![
                r#"unmount navbar {"x":2}"#,
                r#"unmount home null"#,
                r#"bootstrap news null"#,
                r#"mount news null"#,
                r#"mount navbar {"x":2}"#,
            ]
        );
        assert_eq!(fx.page.state_of("navbar", "navbar"), Some(LifecycleState::Mounted));
        assert_eq!(fx.page.state_of("home", "body"), Some(LifecycleState::Unmounted));
        assert!(fx.page.transitions().is_settled());
        assert_eq!(*settled.lock(), 1);
        assert_eq!(fx.surface.stylesheet_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_template_change_is_fatal() {
        let fx = fixture(registry());
        fx.page.start("/").await.unwrap();

        let err = fx.page.navigate("/checkout").await.unwrap_err();

        assert!(matches!(err, NavigationError::TemplateChanged { .. }));
        assert_eq!(fx.page.current_route().id, "home");
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_change_subscription() {
        let fx = fixture(registry());
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        fx.page.on_route_change(move |change| sink.lock().push(change.clone()));
        fx.page.start("/").await.unwrap();

        fx.page.navigate("/news/7").await.unwrap();

        assert_eq!(
            *changes.lock(),
            vec![RouteChange {
                previous_url: Some("/".into()),
                url: "/news/7".into(),
                route_id: "news".into(),
            }]
        );
        assert!(fx.page.match_current_route("/news/8"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_slash_policy_redirects() {
        let config = registry().with_settings(
            Settings::default().with_trailing_slash(TrailingSlashPolicy::RedirectToNonTrailingSlash),
        );
        let fx = fixture(config);
        fx.page.start("/").await.unwrap();

        assert!(!fx.page.navigate("/news/1/").await.unwrap());
        assert_eq!(fx.page.current_route().id, "home");

        tick().await;
        assert_eq!(fx.page.current_route().url, "/news/1");
    }

    // === Error Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_escalates() {
        let fx = fixture(registry());
        fx.page.start("/").await.unwrap();

        fx.page.navigate("/broken").await.unwrap();

        assert_eq!(fx.page.state_of("broken", "body"), Some(LifecycleState::Broken));
        let escalated = fx.sink.escalated();
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].app.as_deref(), Some("broken"));
        assert_eq!(escalated[0].field("kind"), Some("primary"));
    }

    // === Loading Tests ===

    #[tokio::test]
    async fn test_load_app_inserts_stylesheet() {
        let fx = fixture(registry());

        let callbacks = fx.page.load_app("home").await.unwrap();

        assert!(!callbacks.is_noop());
        assert_eq!(fx.surface.stylesheet_count(), 1);
        assert!(fx.page.bundles().is_cached("home"));
        assert!(matches!(
            fx.page.load_app("ghost").await,
            Err(LoadError::UnknownApp(_))
        ));
    }
}
