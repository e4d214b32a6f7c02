//! The compiled route table.

use std::sync::Arc;

use indexmap::IndexMap;
use mosaic_core::{RegistryConfig, Route, RouteDef};
use tracing::debug;

use crate::error::RouterError;
use crate::localizer::{NoopLocalizer, PrefixLocalizer, UrlLocalizer};
use crate::pattern::RoutePattern;
use crate::url::{normalize_path, split_url};

/// Role of the route shown for unmatched URLs.
pub const NOT_FOUND_ROLE: &str = "404";

#[derive(Debug, Clone)]
struct CompiledRoute {
    def: RouteDef,
    pattern: RoutePattern,
}

/// Resolves URLs to routes. Holds no state beyond the compiled table.
#[derive(Clone)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    special: IndexMap<String, RouteDef>,
    localizer: Arc<dyn UrlLocalizer>,
}

impl RouteTable {
    /// Compile a route table.
    pub fn new(routes: Vec<RouteDef>, special: IndexMap<String, RouteDef>) -> Result<Self, RouterError> {
        let routes = routes
            .into_iter()
            .map(|def| {
                let pattern = RoutePattern::parse(&def.pattern)?;
                Ok(CompiledRoute { def, pattern })
            })
            .collect::<Result<Vec<_>, RouterError>>()?;

        Ok(Self {
            routes,
            special,
            localizer: Arc::new(NoopLocalizer),
        })
    }

    /// Compile the table of a registry, with a prefix localizer when i18n is enabled.
    pub fn from_registry(config: &RegistryConfig) -> Result<Self, RouterError> {
        let table = Self::new(config.routes.clone(), config.special_routes.clone())?;
        if config.settings.i18n.enabled {
            Ok(table.with_localizer(Arc::new(PrefixLocalizer::from_settings(&config.settings.i18n))))
        } else {
            Ok(table)
        }
    }

    /// Use a different localizer.
    pub fn with_localizer(mut self, localizer: Arc<dyn UrlLocalizer>) -> Self {
        self.localizer = localizer;
        self
    }

    /// The localizer in use.
    pub fn localizer(&self) -> &Arc<dyn UrlLocalizer> {
        &self.localizer
    }

    /// Route definitions in table order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteDef> {
        self.routes.iter().map(|r| &r.def)
    }

    /// Whether a special role is configured.
    pub fn has_special(&self, role: &str) -> bool {
        self.special.contains_key(role)
    }

    /// Resolve a URL.
    ///
    /// Unmatched URLs resolve to the `404` special route when configured.
    pub fn match_url(&self, url: &str) -> Result<Route, RouterError> {
        let path = self.path_of(url);
        let mut route = Route {
            url: url.to_string(),
            base_path: "/".to_string(),
            ..Default::default()
        };

        for compiled in &self.routes {
            let Some(m) = compiled.pattern.matches(&path) else {
                continue;
            };
            layer(&mut route, &compiled.def);
            route.base_path = m.base_path;
            route.params.extend(m.params);
            if !compiled.def.next {
                break;
            }
        }

        if !route.template.is_empty() {
            debug!(url, route_id = %route.id, "route matched");
            return Ok(route);
        }

        if self.has_special(NOT_FOUND_ROLE) {
            debug!(url, "no route matched, falling back to not-found route");
            return self.match_special(url, NOT_FOUND_ROLE);
        }

        Err(RouterError::NoRouteMatch(url.to_string()))
    }

    /// Resolve a URL to a special route.
    ///
    /// Only the layering (`next`) routes matching the URL contribute, so shared
    /// slots survive while the page body is replaced.
    pub fn match_special(&self, url: &str, role: &str) -> Result<Route, RouterError> {
        let special = self
            .special
            .get(role)
            .ok_or_else(|| RouterError::NoSpecialRoute(role.to_string()))?;

        let path = self.path_of(url);
        let mut route = Route {
            url: url.to_string(),
            base_path: "/".to_string(),
            ..Default::default()
        };

        for compiled in self.routes.iter().filter(|r| r.def.next) {
            if compiled.pattern.matches(&path).is_some() {
                layer(&mut route, &compiled.def);
            }
        }

        layer(&mut route, special);
        route.special_role = Some(role.to_string());

        if route.template.is_empty() {
            return Err(RouterError::NoRouteMatch(url.to_string()));
        }
        Ok(route)
    }

    fn path_of(&self, url: &str) -> String {
        let unlocalized = self.localizer.unlocalize(url);
        let (path, _) = split_url(&unlocalized);
        normalize_path(path)
    }
}

fn layer(route: &mut Route, def: &RouteDef) {
    route.id = def.id.clone();
    route.pattern = def.pattern.clone();
    if let Some(template) = &def.template {
        route.template = template.clone();
    }
    for (slot, assignment) in &def.slots {
        route.slots.insert(slot.clone(), assignment.clone());
    }
    if !def.meta.is_null() {
        route.meta = def.meta.clone();
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes.len())
            .field("special", &self.special.keys().collect::<Vec<_>>())
            .finish()
    }
}
