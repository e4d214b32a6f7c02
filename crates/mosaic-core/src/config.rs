//! Registry configuration: route table, application descriptors and settings.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::descriptor::{AppDescriptor, AppKind};
use crate::route::RouteDef;

/// Error type for registry loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON registry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML registry: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid registry: {0}")]
    Invalid(String),
}

/// Spinner shown while slots are being replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinnerSettings {
    /// Whether the spinner is shown at all.
    pub enabled: bool,
    /// Custom markup. May contain `<script>` blocks.
    pub custom_html: Option<String>,
    /// Delay before the spinner appears.
    pub show_after_ms: u64,
    /// Minimum time the spinner stays once shown.
    pub min_visible_ms: u64,
}

impl Default for SpinnerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_html: None,
            show_after_ms: 300,
            min_visible_ms: 500,
        }
    }
}

impl SpinnerSettings {
    /// Delay before the spinner appears.
    pub fn show_after(&self) -> Duration {
        Duration::from_millis(self.show_after_ms)
    }

    /// Minimum visible duration.
    pub fn min_visible(&self) -> Duration {
        Duration::from_millis(self.min_visible_ms)
    }
}

/// What to do with a trailing slash in the requested URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingSlashPolicy {
    #[default]
    DoNothing,
    RedirectToNonTrailingSlash,
    RedirectToTrailingSlash,
}

/// URL localization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct I18nSettings {
    /// Whether localized URLs are in use.
    pub enabled: bool,
    /// Locale served without a URL prefix.
    pub default_locale: String,
    /// Locales recognized as a leading path segment.
    pub supported_locales: Vec<String>,
}

impl Default for I18nSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            default_locale: "en".to_string(),
            supported_locales: Vec::new(),
        }
    }
}

/// Stylesheet handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssSettings {
    /// Always defer removal of unused stylesheets until slots settle.
    pub delay_removal: bool,
}

/// Bundle-load retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub attempts: u32,
    /// Initial backoff.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Page-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub spinner: SpinnerSettings,
    pub trailing_slash: TrailingSlashPolicy,
    pub i18n: I18nSettings,
    pub css: CssSettings,
    pub retry: RetrySettings,
}

impl Settings {
    /// Set the spinner settings.
    pub fn with_spinner(mut self, spinner: SpinnerSettings) -> Self {
        self.spinner = spinner;
        self
    }

    /// Set the trailing-slash policy.
    pub fn with_trailing_slash(mut self, policy: TrailingSlashPolicy) -> Self {
        self.trailing_slash = policy;
        self
    }

    /// Set the i18n settings.
    pub fn with_i18n(mut self, i18n: I18nSettings) -> Self {
        self.i18n = i18n;
        self
    }
}

/// Everything the registry hands to the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Application descriptors by name.
    #[serde(default)]
    pub apps: IndexMap<String, AppDescriptor>,
    /// Ordered route table.
    #[serde(default)]
    pub routes: Vec<RouteDef>,
    /// Routes by special role (e.g. `404`).
    #[serde(default)]
    pub special_routes: IndexMap<String, RouteDef>,
    /// Page-wide settings.
    #[serde(default)]
    pub settings: Settings,
}

impl RegistryConfig {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON registry.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.normalized()
    }

    /// Parse a TOML registry.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.normalized()
    }

    /// Load a registry file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().map_or(false, |ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Register an application.
    pub fn with_app(mut self, app: AppDescriptor) -> Self {
        self.apps.insert(app.name.clone(), app);
        self
    }

    /// Append a route.
    pub fn with_route(mut self, route: RouteDef) -> Self {
        self.routes.push(route);
        self
    }

    /// Register a special route.
    pub fn with_special_route(mut self, role: impl Into<String>, route: RouteDef) -> Self {
        self.special_routes.insert(role.into(), route);
        self
    }

    /// Set the settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Get an application descriptor.
    pub fn app(&self, name: &str) -> Option<&AppDescriptor> {
        self.apps.get(name)
    }

    /// Every distinct (application, slot) pair any route can produce, in table order.
    pub fn slot_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let all_routes = self.routes.iter().chain(self.special_routes.values());
        for route in all_routes {
            for (slot, assignment) in &route.slots {
                let pair = (assignment.app.clone(), slot.clone());
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    /// Check cross-references between routes and descriptors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_routes = self.routes.iter().chain(self.special_routes.values());
        for route in all_routes {
            for (slot, assignment) in &route.slots {
                if !self.apps.contains_key(&assignment.app) {
                    return Err(ConfigError::Invalid(format!(
                        "route '{}' assigns unknown app '{}' to slot '{}'",
                        route.id, assignment.app, slot
                    )));
                }
            }
        }

        for app in self.apps.values() {
            if let Some(wrapper) = &app.wrapped_with {
                match self.apps.get(wrapper) {
                    Some(w) if w.kind == AppKind::Wrapper => {}
                    Some(_) => {
                        return Err(ConfigError::Invalid(format!(
                            "app '{}' is wrapped by '{}' which is not of kind wrapper",
                            app.name, wrapper
                        )))
                    }
                    None => {
                        return Err(ConfigError::Invalid(format!(
                            "app '{}' is wrapped by unknown app '{}'",
                            app.name, wrapper
                        )))
                    }
                }
            }
        }

        Ok(())
    }

    fn normalized(mut self) -> Result<Self, ConfigError> {
        for (name, app) in self.apps.iter_mut() {
            if app.name.is_empty() {
                app.name = name.clone();
            }
        }
        self.validate()?;
        Ok(self)
    }
}
