//! Application descriptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How much the page depends on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    /// The main content of the page. May raise the not-found signal.
    Primary,
    /// Required for the page to be usable.
    Essential,
    /// Everything else.
    #[default]
    Regular,
    /// Renders in place of another application until asked to hand over.
    Wrapper,
}

impl AppKind {
    /// Errors from primary and essential applications break the page.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Primary | Self::Essential)
    }

    /// Get the name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Essential => "essential",
            Self::Regular => "regular",
            Self::Wrapper => "wrapper",
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Static description of a fragment application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Logical application name. Filled from the registry key when omitted.
    #[serde(default)]
    pub name: String,
    /// Executable bundle reference. `None` for server-render-only apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spa_bundle: Option<String>,
    /// Stylesheet reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_bundle: Option<String>,
    /// Application kind.
    #[serde(default)]
    pub kind: AppKind,
    /// Name of the wrapper application rendered in place of this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_with: Option<String>,
    /// Default props, deep-merged under route-level props.
    #[serde(default)]
    pub props: Value,
    /// Import-map style dependency overrides (module name -> location).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

impl AppDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the executable bundle.
    pub fn with_spa_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.spa_bundle = Some(bundle.into());
        self
    }

    /// Set the stylesheet.
    pub fn with_css_bundle(mut self, href: impl Into<String>) -> Self {
        self.css_bundle = Some(href.into());
        self
    }

    /// Set the kind.
    pub fn with_kind(mut self, kind: AppKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declare a wrapper application.
    pub fn with_wrapper(mut self, wrapper: impl Into<String>) -> Self {
        self.wrapped_with = Some(wrapper.into());
        self
    }

    /// Set default props.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Add a dependency override.
    pub fn with_dependency(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), location.into());
        self
    }

    /// Whether the application ships client-side code.
    pub fn has_bundle(&self) -> bool {
        self.spa_bundle.is_some()
    }
}
