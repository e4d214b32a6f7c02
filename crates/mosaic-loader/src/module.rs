//! The module-loading seam.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mosaic_core::LifecycleCallbacks;
use parking_lot::Mutex;
use serde_json::Value;

/// Error type for bundle loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("Unknown application: {0}")]
    UnknownApp(String),

    #[error("Network error loading {module}: {message}")]
    Network { module: String, message: String },

    #[error("Timeout loading {0}")]
    Timeout(String),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Module {module} failed to evaluate: {message}")]
    Evaluation { module: String, message: String },

    #[error("Stylesheet already loaded: {0}")]
    StylesheetAlreadyLoaded(String),

    #[error("Gave up loading {module} after {attempts} attempts: {last}")]
    RetriesExhausted {
        module: String,
        attempts: u32,
        last: Box<LoadError>,
    },
}

impl LoadError {
    /// Whether retrying the same import may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout(_))
    }
}

/// Identity of a loaded module, as resolved by the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    /// Create a module id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds lifecycle callbacks from an application's default props.
pub type ModuleFactory = Arc<dyn Fn(&Value) -> LifecycleCallbacks + Send + Sync>;

/// What a fragment module exports.
#[derive(Clone)]
pub enum ModuleExport {
    /// A factory, invoked once per module load.
    Factory(ModuleFactory),
    /// Ready-made callbacks.
    Direct(LifecycleCallbacks),
}

impl ModuleExport {
    /// Wrap a factory function.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Value) -> LifecycleCallbacks + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Wrap ready-made callbacks.
    pub fn direct(callbacks: LifecycleCallbacks) -> Self {
        Self::Direct(callbacks)
    }

    /// Produce the callbacks, invoking the factory if needed.
    pub fn into_callbacks(self, props: &Value) -> LifecycleCallbacks {
        match self {
            Self::Factory(make) => make(props),
            Self::Direct(callbacks) => callbacks,
        }
    }
}

impl fmt::Debug for ModuleExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("ModuleExport::Factory"),
            Self::Direct(callbacks) => f.debug_tuple("ModuleExport::Direct").field(callbacks).finish(),
        }
    }
}

/// Module-loading substrate.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Import a module by specifier.
    async fn import(&self, specifier: &str) -> Result<ModuleExport, LoadError>;

    /// Resolve a specifier to the id the module is registered under.
    fn resolve(&self, specifier: &str) -> ModuleId;

    /// An already-imported module.
    fn get(&self, id: &ModuleId) -> Option<ModuleExport>;

    /// Evict a module. Returns whether it was loaded.
    fn delete(&self, id: &ModuleId) -> bool;

    /// Point a named import at a different location.
    fn override_import(&self, name: &str, location: &str);
}

#[derive(Default)]
struct StaticInner {
    available: HashMap<String, ModuleExport>,
    loaded: HashMap<ModuleId, ModuleExport>,
    overrides: HashMap<String, String>,
    failures: HashMap<String, VecDeque<LoadError>>,
    imports: HashMap<String, usize>,
}

/// Module loader over a fixed set of in-process modules.
///
/// Failures can be queued per specifier to exercise retry paths.
#[derive(Default)]
pub struct StaticModuleLoader {
    inner: Mutex<StaticInner>,
}

impl StaticModuleLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module available under a location.
    pub fn with_module(self, location: impl Into<String>, export: ModuleExport) -> Self {
        self.insert(location, export);
        self
    }

    /// Make a module available under a location.
    pub fn insert(&self, location: impl Into<String>, export: ModuleExport) {
        self.inner.lock().available.insert(location.into(), export);
    }

    /// Fail the next import of `specifier` with `error`.
    pub fn fail_next(&self, specifier: &str, error: LoadError) {
        self.inner
            .lock()
            .failures
            .entry(specifier.to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of import attempts for a specifier.
    pub fn import_count(&self, specifier: &str) -> usize {
        self.inner.lock().imports.get(specifier).copied().unwrap_or(0)
    }

    /// Current override for a named import.
    pub fn override_of(&self, name: &str) -> Option<String> {
        self.inner.lock().overrides.get(name).cloned()
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn import(&self, specifier: &str) -> Result<ModuleExport, LoadError> {
        let id = self.resolve(specifier);
        let mut inner = self.inner.lock();
        *inner.imports.entry(specifier.to_string()).or_default() += 1;

        if let Some(err) = inner.failures.get_mut(specifier).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(export) = inner.loaded.get(&id) {
            return Ok(export.clone());
        }

        let export = inner
            .available
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(specifier.to_string()))?;
        inner.loaded.insert(id, export.clone());
        Ok(export)
    }

    fn resolve(&self, specifier: &str) -> ModuleId {
        let inner = self.inner.lock();
        ModuleId::new(inner.overrides.get(specifier).map_or(specifier, String::as_str))
    }

    fn get(&self, id: &ModuleId) -> Option<ModuleExport> {
        self.inner.lock().loaded.get(id).cloned()
    }

    fn delete(&self, id: &ModuleId) -> bool {
        self.inner.lock().loaded.remove(id).is_some()
    }

    fn override_import(&self, name: &str, location: &str) {
        self.inner
            .lock()
            .overrides
            .insert(name.to_string(), location.to_string());
    }
}

impl fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StaticModuleLoader")
            .field("available", &inner.available.len())
            .field("loaded", &inner.loaded.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transient_errors() {
        assert!(LoadError::Timeout("a".into()).is_transient());
        assert!(LoadError::Network {
            module: "a".into(),
            message: "reset".into()
        }
        .is_transient());
        assert!(!LoadError::UnknownApp("a".into()).is_transient());
        assert!(!LoadError::Evaluation {
            module: "a".into(),
            message: "boom".into()
        }
        .is_transient());
    }

    #[test]
    fn test_factory_receives_props() {
        let export = ModuleExport::factory(|props| {
            assert_eq!(props, &json!({"x": 1}));
            LifecycleCallbacks::noop()
        });

        assert!(export.into_callbacks(&json!({"x": 1})).is_noop());
    }

    #[tokio::test]
    async fn test_static_loader_import_and_delete() {
        let loader = StaticModuleLoader::new()
            .with_module("/navbar.js", ModuleExport::direct(LifecycleCallbacks::noop()));

        assert!(loader.import("/navbar.js").await.is_ok());
        let id = loader.resolve("/navbar.js");
        assert!(loader.get(&id).is_some());
        assert!(loader.delete(&id));
        assert!(loader.get(&id).is_none());
        assert_eq!(loader.import_count("/navbar.js"), 1);
    }

    #[tokio::test]
    async fn test_static_loader_overrides() {
        let loader = StaticModuleLoader::new()
            .with_module("/react@18.js", ModuleExport::direct(LifecycleCallbacks::noop()));
        loader.override_import("react", "/react@18.js");

        assert_eq!(loader.resolve("react").as_str(), "/react@18.js");
        assert!(loader.import("react").await.is_ok());
        assert_eq!(loader.override_of("react").as_deref(), Some("/react@18.js"));
    }

    #[tokio::test]
    async fn test_static_loader_queued_failures() {
        let loader = StaticModuleLoader::new()
            .with_module("/a.js", ModuleExport::direct(LifecycleCallbacks::noop()));
        loader.fail_next("/a.js", LoadError::Timeout("/a.js".into()));

        assert_eq!(
            loader.import("/a.js").await.unwrap_err(),
            LoadError::Timeout("/a.js".into())
        );
        assert!(loader.import("/a.js").await.is_ok());
        assert!(loader.import("/missing.js").await.is_err());
    }
}
