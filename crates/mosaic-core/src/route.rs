//! Route definitions and matched routes.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{AppDescriptor, AppKind};
use crate::props::deep_merge;

/// Assignment of an application to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAssignment {
    /// Application name.
    pub app: String,
    /// Route-level props, deep-merged over the descriptor defaults.
    #[serde(default)]
    pub props: Value,
    /// Kind override for this placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AppKind>,
}

impl SlotAssignment {
    /// Create a new assignment.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            props: Value::Null,
            kind: None,
        }
    }

    /// Set route-level props.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Set the kind override.
    pub fn with_kind(mut self, kind: AppKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A route as configured in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDef {
    /// Route identifier.
    pub id: String,
    /// Path pattern (`/`, `/news/:id`, `/news/*`, `*`).
    pub pattern: String,
    /// Template identifier. Layering routes usually leave it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Keep matching after this route, layering later routes on top.
    #[serde(default)]
    pub next: bool,
    /// Slot name -> application assignment, in declaration order.
    #[serde(default)]
    pub slots: IndexMap<String, SlotAssignment>,
    /// Opaque metadata handed to navigation guards.
    #[serde(default)]
    pub meta: Value,
}

impl RouteDef {
    /// Create a new route definition.
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            template: None,
            next: false,
            slots: IndexMap::new(),
            meta: Value::Null,
        }
    }

    /// Set the template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Continue matching after this route.
    pub fn with_next(mut self, next: bool) -> Self {
        self.next = next;
        self
    }

    /// Assign an application to a slot.
    pub fn with_slot(mut self, slot: impl Into<String>, assignment: SlotAssignment) -> Self {
        self.slots.insert(slot.into(), assignment);
        self
    }

    /// Set guard metadata.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

/// A route resolved for a concrete URL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    /// Identifier of the last matching route.
    pub id: String,
    /// Pattern of the last matching route.
    pub pattern: String,
    /// Template identifier.
    pub template: String,
    /// Special role (e.g. `404`).
    pub special_role: Option<String>,
    /// Accumulated slot assignments.
    pub slots: IndexMap<String, SlotAssignment>,
    /// The requested URL, as given.
    pub url: String,
    /// Base path matched by the route pattern.
    pub base_path: String,
    /// Named path segments.
    pub params: BTreeMap<String, String>,
    /// Guard metadata of the last matching route.
    pub meta: Value,
}

impl Route {
    /// Get the assignment of a slot.
    pub fn slot(&self, slot: &str) -> Option<&SlotAssignment> {
        self.slots.get(slot)
    }

    /// Whether this route places `app` into `slot`.
    pub fn assigns(&self, app: &str, slot: &str) -> bool {
        self.slot(slot).map_or(false, |s| s.app == app)
    }

    /// Whether this route has a special role.
    pub fn is_special(&self) -> bool {
        self.special_role.is_some()
    }

    /// Find the slot holding `app`.
    pub fn slot_of(&self, app: &str) -> Option<(&str, &SlotAssignment)> {
        self.slots
            .iter()
            .find(|(_, s)| s.app == app)
            .map(|(name, s)| (name.as_str(), s))
    }

    /// Descriptor defaults deep-merged with the route-level props of `slot`.
    pub fn merged_props(&self, descriptor: &AppDescriptor, slot: &str) -> Option<Value> {
        self.slot(slot)
            .filter(|s| s.app == descriptor.name)
            .map(|s| deep_merge(&descriptor.props, &s.props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_route() -> Route {
        let mut slots = IndexMap::new();
        slots.insert(
            "navbar".to_string(),
            SlotAssignment::new("navbar").with_props(json!({"x": 1})),
        );
        slots.insert("body".to_string(), SlotAssignment::new("news").with_kind(AppKind::Primary));
        Route {
            id: "news".to_string(),
            template: "master".to_string(),
            slots,
            ..Default::default()
        }
    }

    #[test]
    fn test_route_assigns() {
        let route = sample_route();

        assert!(route.assigns("navbar", "navbar"));
        assert!(!route.assigns("navbar", "body"));
        assert!(!route.assigns("footer", "footer"));
    }

    #[test]
    fn test_route_slot_of() {
        let route = sample_route();
        let (slot, assignment) = route.slot_of("news").unwrap();

        assert_eq!(slot, "body");
        assert_eq!(assignment.kind, Some(AppKind::Primary));
        assert!(route.slot_of("missing").is_none());
    }

    #[test]
    fn test_route_merged_props() {
        let route = sample_route();
        let app = AppDescriptor::new("navbar").with_props(json!({"x": 0, "y": 2}));

        assert_eq!(route.merged_props(&app, "navbar"), Some(json!({"x": 1, "y": 2})));
        assert_eq!(route.merged_props(&app, "body"), None);
    }

    #[test]
    fn test_route_def_from_json() {
        let def: RouteDef = serde_json::from_str(
            r#"{"id": "home", "pattern": "/", "template": "master",
                "slots": {"body": {"app": "home"}, "footer": {"app": "footer"}}}"#,
        )
        .unwrap();

        assert!(!def.next);
        let names: Vec<&str> = def.slots.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["body", "footer"]);
    }
}
