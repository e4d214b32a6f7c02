//! Slot diff between two URLs.

use anyhow::Result;
use mosaic_sdk::prelude::{RegistryConfig, Route};
use serde::Serialize;

use super::DiffArgs;
use crate::context::Context;
use crate::output::{change_badge, format_props};
use super::resolve::descriptor_of;

/// What happens to a slot when navigating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotChange {
    pub slot: String,
    pub change: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_app: Option<String>,
    pub props: serde_json::Value,
}

/// Compare the slots of two routes, in the order they appear (`from` first).
pub fn slot_changes(registry: &RegistryConfig, from: &Route, to: &Route) -> Vec<SlotChange> {
    let mut slots: Vec<&String> = from.slots.keys().collect();
    slots.extend(to.slots.keys().filter(|slot| !from.slots.contains_key(*slot)));

    slots
        .into_iter()
        .map(|slot| {
            let before = from.slot(slot);
            let after = to.slot(slot);
            let props = after
                .and_then(|a| to.merged_props(&descriptor_of(registry, &a.app), slot))
                .unwrap_or_default();

            let change = match (before, after) {
                (Some(b), Some(a)) if b.app == a.app => {
                    let descriptor = descriptor_of(registry, &a.app);
                    if from.merged_props(&descriptor, slot) == to.merged_props(&descriptor, slot) {
                        "unchanged"
                    } else {
                        "rerendered"
                    }
                }
                (Some(_), Some(_)) => "replaced",
                (None, Some(_)) => "rendered",
                (Some(_), None) => "removed",
                (None, None) => "unchanged",
            };

            SlotChange {
                slot: slot.clone(),
                change,
                from_app: before.map(|b| b.app.clone()),
                to_app: after.map(|a| a.app.clone()),
                props,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct DiffReport {
    from: String,
    to: String,
    template_changed: bool,
    slots: Vec<SlotChange>,
}

/// Run the diff command.
pub async fn run(args: DiffArgs, ctx: &Context) -> Result<()> {
    let table = ctx.table()?;
    let from = table.match_url(&args.from)?;
    let to = table.match_url(&args.to)?;
    let report = DiffReport {
        from: from.id.clone(),
        to: to.id.clone(),
        template_changed: from.template != to.template,
        slots: slot_changes(&ctx.registry, &from, &to),
    };

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.header(&format!("{} ({}) -> {} ({})", args.from, report.from, args.to, report.to));
    if report.template_changed {
        ctx.output.warn(&format!(
            "Template changes from '{}' to '{}': this navigation fails at runtime",
            from.template, to.template
        ));
    }

    let widths = [12, 12, 16, 16, 30];
    ctx.output.table_row(&["SLOT", "CHANGE", "FROM", "TO", "PROPS"], &widths);
    for change in &report.slots {
        ctx.output.table_row(
            &[
                &change.slot,
                &change_badge(change.change),
                change.from_app.as_deref().unwrap_or("-"),
                change.to_app.as_deref().unwrap_or("-"),
                &format_props(&change.props),
            ],
            &widths,
        );
    }

    Ok(())
}
