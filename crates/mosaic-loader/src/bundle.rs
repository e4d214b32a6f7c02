//! Application bundle loading with memoization.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use mosaic_core::{AppDescriptor, LifecycleCallbacks, RegistryConfig};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::css::CssTracker;
use crate::module::{LoadError, ModuleExport, ModuleId, ModuleLoader};
use crate::retry::RetryPolicy;

/// Options for a single load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Decorate the callbacks with stylesheet tracking when the
    /// application declares a stylesheet.
    pub inject_css: bool,
}

impl LoadOptions {
    /// Load without stylesheet tracking.
    pub fn without_css() -> Self {
        Self { inject_css: false }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { inject_css: true }
    }
}

/// Resolves application names to lifecycle callbacks.
///
/// Callbacks are memoized per loaded module, so a factory export runs once
/// per module load no matter how many slots host the application.
pub struct BundleLoader {
    apps: IndexMap<String, AppDescriptor>,
    modules: Arc<dyn ModuleLoader>,
    css: Arc<CssTracker>,
    retry: RetryPolicy,
    cache: Mutex<HashMap<ModuleId, LifecycleCallbacks>>,
}

impl BundleLoader {
    /// Create a loader over a set of application descriptors.
    pub fn new(
        apps: IndexMap<String, AppDescriptor>,
        modules: Arc<dyn ModuleLoader>,
        css: Arc<CssTracker>,
    ) -> Self {
        Self {
            apps,
            modules,
            css,
            retry: RetryPolicy::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create a loader for a registry, using its retry settings.
    pub fn from_registry(
        config: &RegistryConfig,
        modules: Arc<dyn ModuleLoader>,
        css: Arc<CssTracker>,
    ) -> Self {
        Self::new(config.apps.clone(), modules, css)
            .with_retry(RetryPolicy::from_settings(&config.settings.retry))
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The module-loading substrate.
    pub fn modules(&self) -> &Arc<dyn ModuleLoader> {
        &self.modules
    }

    /// The stylesheet tracker.
    pub fn css(&self) -> &Arc<CssTracker> {
        &self.css
    }

    /// Descriptor of a registered application.
    pub fn descriptor(&self, name: &str) -> Result<&AppDescriptor, LoadError> {
        self.apps
            .get(name)
            .ok_or_else(|| LoadError::UnknownApp(name.to_string()))
    }

    /// Warm the module cache. Failures are logged and otherwise ignored.
    pub async fn preload_app(&self, name: &str) {
        let Some(bundle) = self.apps.get(name).and_then(|d| d.spa_bundle.as_deref()) else {
            return;
        };
        if let Err(err) = self.modules.import(bundle).await {
            debug!(app = name, error = %err, "preload failed");
        }
    }

    /// Load the callbacks of a registered application.
    pub async fn load_app(&self, name: &str, options: LoadOptions) -> Result<LifecycleCallbacks, LoadError> {
        let descriptor = self.descriptor(name)?.clone();
        self.load_descriptor(&descriptor, options).await
    }

    /// Load callbacks while inserting the application's stylesheet in parallel.
    pub async fn load_app_with_css(&self, name: &str) -> Result<LifecycleCallbacks, LoadError> {
        let descriptor = self.descriptor(name)?.clone();
        let Some(href) = descriptor.css_bundle.clone() else {
            return self.load_descriptor(&descriptor, LoadOptions::default()).await;
        };

        let css = async {
            match self.css.preload(&href) {
                Ok(_) | Err(LoadError::StylesheetAlreadyLoaded(_)) => Ok(()),
                Err(err) => Err(err),
            }
        };
        let (callbacks, css) = futures::join!(self.load_descriptor(&descriptor, LoadOptions::default()), css);
        css?;
        callbacks
    }

    /// Load the callbacks described by `descriptor`.
    ///
    /// Used directly when the descriptor carries per-page overrides.
    pub async fn load_descriptor(
        &self,
        descriptor: &AppDescriptor,
        options: LoadOptions,
    ) -> Result<LifecycleCallbacks, LoadError> {
        let Some(bundle) = descriptor.spa_bundle.as_deref() else {
            debug!(app = %descriptor.name, "no bundle, using no-op callbacks");
            return Ok(LifecycleCallbacks::noop());
        };

        let id = self.modules.resolve(bundle);
        let cached = self.cache.lock().get(&id).cloned();
        let callbacks = match cached {
            Some(callbacks) => callbacks,
            None => {
                let export = self.retry.run(bundle, || self.modules.import(bundle)).await?;
                debug!(app = %descriptor.name, module = %id, "module loaded");
                self.memoize(id, export, descriptor)
            }
        };

        match descriptor.css_bundle.as_deref() {
            Some(href) if options.inject_css => Ok(self.css.decorate(callbacks, href)),
            _ => Ok(callbacks),
        }
    }

    fn memoize(&self, id: ModuleId, export: ModuleExport, descriptor: &AppDescriptor) -> LifecycleCallbacks {
        let mut cache = self.cache.lock();
        let callbacks = cache
            .entry(id)
            .or_insert_with(|| export.into_callbacks(&descriptor.props));
        callbacks.clone()
    }

    /// Evict an application's module so the next load imports it afresh.
    pub fn unload_app(&self, name: &str) -> Result<(), LoadError> {
        let descriptor = self.descriptor(name)?;
        let Some(bundle) = descriptor.spa_bundle.as_deref() else {
            return Ok(());
        };
        let id = self.modules.resolve(bundle);
        self.cache.lock().remove(&id);
        if !self.modules.delete(&id) {
            warn!(app = name, module = %id, "unloading a module that was not loaded");
        }
        Ok(())
    }

    /// Whether callbacks for the application's module are memoized.
    pub fn is_cached(&self, name: &str) -> bool {
        self.apps
            .get(name)
            .and_then(|d| d.spa_bundle.as_deref())
            .map_or(false, |bundle| {
                let id = self.modules.resolve(bundle);
                self.cache.lock().contains_key(&id)
            })
    }
}

impl std::fmt::Debug for BundleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleLoader")
            .field("apps", &self.apps.len())
            .field("cached", &self.cache.lock().len())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StaticModuleLoader;
    use mosaic_core::{CssSettings, MemorySurface, MountProps, RenderSurface};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        surface: Arc<MemorySurface>,
        modules: Arc<StaticModuleLoader>,
        loader: BundleLoader,
    }

    fn fixture(apps: Vec<AppDescriptor>) -> Fixture {
        let surface = Arc::new(MemorySurface::new());
        let modules = Arc::new(StaticModuleLoader::new());
        let css = Arc::new(CssTracker::new(surface.clone(), &CssSettings::default()));
        let apps = apps.into_iter().map(|d| (d.name.clone(), d)).collect();
        let loader = BundleLoader::new(apps, modules.clone(), css);
        Fixture {
            surface,
            modules,
            loader,
        }
    }

    fn navbar() -> AppDescriptor {
        AppDescriptor::new("navbar")
            .with_spa_bundle("/navbar.js")
            .with_props(json!({"theme": "dark"}))
    }

    fn counting_factory(calls: Arc<AtomicUsize>) -> ModuleExport {
        ModuleExport::factory(move |props| {
            assert_eq!(props, &json!({"theme": "dark"}));
            calls.fetch_add(1, Ordering::SeqCst);
            LifecycleCallbacks::noop()
        })
    }

    // === Loading Tests ===

    #[tokio::test]
    async fn test_factory_invoked_once_per_module_load() {
        let fx = fixture(vec![navbar()]);
        let calls = Arc::new(AtomicUsize::new(0));
        fx.modules.insert("/navbar.js", counting_factory(calls.clone()));

        fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap();
        fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.modules.import_count("/navbar.js"), 1);
        assert!(fx.loader.is_cached("navbar"));
    }

    #[tokio::test]
    async fn test_unload_forces_fresh_factory_call() {
        let fx = fixture(vec![navbar()]);
        let calls = Arc::new(AtomicUsize::new(0));
        fx.modules.insert("/navbar.js", counting_factory(calls.clone()));

        fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap();
        fx.loader.unload_app("navbar").unwrap();
        assert!(!fx.loader.is_cached("navbar"));
        fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_bundle_yields_noop() {
        let fx = fixture(vec![AppDescriptor::new("ssr-only")]);

        let callbacks = fx.loader.load_app("ssr-only", LoadOptions::default()).await.unwrap();

        assert!(callbacks.is_noop());
    }

    #[tokio::test]
    async fn test_unknown_app() {
        let fx = fixture(vec![]);

        let err = fx.loader.load_app("ghost", LoadOptions::default()).await.unwrap_err();

        assert_eq!(err, LoadError::UnknownApp("ghost".to_string()));
    }

    // === Retry Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let fx = fixture(vec![navbar()]);
        fx.modules
            .insert("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));
        fx.modules.fail_next("/navbar.js", LoadError::Timeout("/navbar.js".into()));

        assert!(fx.loader.load_app("navbar", LoadOptions::default()).await.is_ok());
        assert_eq!(fx.modules.import_count("/navbar.js"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let fx = fixture(vec![navbar()]);

        let err = fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap_err();

        assert_eq!(err, LoadError::NotFound("/navbar.js".into()));
        assert_eq!(fx.modules.import_count("/navbar.js"), 1);
    }

    #[tokio::test]
    async fn test_preload_swallows_errors() {
        let fx = fixture(vec![navbar()]);

        fx.loader.preload_app("navbar").await;
        fx.loader.preload_app("ghost").await;

        assert_eq!(fx.modules.import_count("/navbar.js"), 1);
    }

    // === Stylesheet Tests ===

    #[tokio::test]
    async fn test_css_bundle_decorates_callbacks() {
        let fx = fixture(vec![navbar().with_css_bundle("/navbar.css")]);
        fx.modules
            .insert("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));

        let callbacks = fx.loader.load_app("navbar", LoadOptions::default()).await.unwrap();
        callbacks.mount.run(MountProps::default()).await.unwrap();

        assert!(fx.surface.find_stylesheet("/navbar.css").is_some());
        assert_eq!(fx.loader.css().usage_count("/navbar.css"), 1);
    }

    #[tokio::test]
    async fn test_inject_css_disabled() {
        let fx = fixture(vec![navbar().with_css_bundle("/navbar.css")]);
        fx.modules
            .insert("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));

        let callbacks = fx.loader.load_app("navbar", LoadOptions::without_css()).await.unwrap();
        callbacks.mount.run(MountProps::default()).await.unwrap();

        assert!(fx.surface.find_stylesheet("/navbar.css").is_none());
    }

    #[tokio::test]
    async fn test_load_with_css_tolerates_existing_link() {
        let fx = fixture(vec![navbar().with_css_bundle("/navbar.css")]);
        fx.modules
            .insert("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));
        fx.surface.insert_stylesheet("/navbar.css");

        assert!(fx.loader.load_app_with_css("navbar").await.is_ok());
        assert_eq!(fx.surface.stylesheet_count(), 1);
    }

    #[tokio::test]
    async fn test_load_with_css_inserts_link() {
        let fx = fixture(vec![navbar().with_css_bundle("/navbar.css")]);
        fx.modules
            .insert("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));

        fx.loader.load_app_with_css("navbar").await.unwrap();

        assert!(fx.surface.find_stylesheet("/navbar.css").is_some());
    }
}
