//! Route table listing.

use anyhow::Result;
use mosaic_sdk::prelude::RouteDef;
use serde::Serialize;

use super::RoutesArgs;
use crate::context::Context;

#[derive(Serialize)]
struct RouteRow<'a> {
    id: &'a str,
    pattern: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    template: Option<&'a str>,
    next: bool,
    slots: Vec<String>,
}

impl<'a> RouteRow<'a> {
    fn new(def: &'a RouteDef, role: Option<&'a str>) -> Self {
        Self {
            id: &def.id,
            pattern: &def.pattern,
            role,
            template: def.template.as_deref(),
            next: def.next,
            slots: def
                .slots
                .iter()
                .map(|(slot, assignment)| format!("{}={}", slot, assignment.app))
                .collect(),
        }
    }
}

/// Run the routes command.
pub async fn run(args: RoutesArgs, ctx: &Context) -> Result<()> {
    let registry = &ctx.registry;
    let mut rows: Vec<RouteRow> = registry.routes.iter().map(|def| RouteRow::new(def, None)).collect();
    if args.special {
        rows.extend(
            registry
                .special_routes
                .iter()
                .map(|(role, def)| RouteRow::new(def, Some(role.as_str()))),
        );
    }

    if ctx.output.is_json() {
        ctx.output.json(&rows);
        return Ok(());
    }

    ctx.output.header(&format!("Routes in {}", ctx.registry_path.display()));
    let widths = [16, 20, 12, 6, 40];
    ctx.output.table_row(&["ID", "PATTERN", "TEMPLATE", "NEXT", "SLOTS"], &widths);

    for row in &rows {
        let id = match row.role {
            Some(role) => format!("{} [{}]", row.id, role),
            None => row.id.to_string(),
        };
        let next = if row.next { "yes" } else { "-" };
        let slots = row.slots.join(", ");
        ctx.output.table_row(
            &[&id, row.pattern, row.template.unwrap_or("-"), next, &slots],
            &widths,
        );
    }

    ctx.output.info("");
    ctx.output.info(&format!(
        "{} route(s), {} application(s)",
        rows.len(),
        registry.apps.len()
    ));

    Ok(())
}
