//! URL resolution.

use anyhow::Result;
use mosaic_sdk::prelude::{AppDescriptor, RegistryConfig, Route};
use serde::Serialize;

use super::MatchArgs;
use crate::context::Context;
use crate::output::format_props;

/// A resolved route, as printed.
#[derive(Debug, Serialize)]
pub struct ResolvedRoute {
    pub id: String,
    pub url: String,
    pub template: String,
    pub base_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_role: Option<String>,
    pub params: std::collections::BTreeMap<String, String>,
    pub slots: Vec<ResolvedSlot>,
}

/// One slot of a resolved route.
#[derive(Debug, Serialize)]
pub struct ResolvedSlot {
    pub slot: String,
    pub app: String,
    pub kind: String,
    pub props: serde_json::Value,
}

/// The registry descriptor of `app`, or a bare one.
pub fn descriptor_of(registry: &RegistryConfig, app: &str) -> AppDescriptor {
    registry
        .app(app)
        .cloned()
        .unwrap_or_else(|| AppDescriptor::new(app))
}

impl ResolvedRoute {
    pub fn new(route: &Route, registry: &RegistryConfig) -> Self {
        let slots = route
            .slots
            .iter()
            .map(|(slot, assignment)| {
                let descriptor = descriptor_of(registry, &assignment.app);
                ResolvedSlot {
                    slot: slot.clone(),
                    app: assignment.app.clone(),
                    kind: assignment.kind.unwrap_or(descriptor.kind).to_string(),
                    props: route.merged_props(&descriptor, slot).unwrap_or_default(),
                }
            })
            .collect();

        Self {
            id: route.id.clone(),
            url: route.url.clone(),
            template: route.template.clone(),
            base_path: route.base_path.clone(),
            special_role: route.special_role.clone(),
            params: route.params.clone(),
            slots,
        }
    }
}

/// Run the match command.
pub async fn run(args: MatchArgs, ctx: &Context) -> Result<()> {
    let table = ctx.table()?;
    let route = match &args.special {
        Some(role) => table.match_special(&args.url, role)?,
        None => table.match_url(&args.url)?,
    };
    let resolved = ResolvedRoute::new(&route, &ctx.registry);

    if ctx.output.is_json() {
        ctx.output.json(&resolved);
        return Ok(());
    }

    ctx.output.header(&format!("{} -> {}", resolved.url, resolved.id));
    ctx.output.kv("template", &resolved.template);
    ctx.output.kv("base path", &resolved.base_path);
    if let Some(role) = &resolved.special_role {
        ctx.output.kv("special role", role);
    }
    for (name, value) in &resolved.params {
        ctx.output.kv(&format!("param {}", name), value);
    }

    ctx.output.header("Slots");
    let widths = [12, 16, 10, 40];
    ctx.output.table_row(&["SLOT", "APP", "KIND", "PROPS"], &widths);
    for slot in &resolved.slots {
        ctx.output
            .table_row(&[&slot.slot, &slot.app, &slot.kind, &format_props(&slot.props)], &widths);
    }

    Ok(())
}
