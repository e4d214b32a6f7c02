//! Navigation replay against stub fragments.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use mosaic_sdk::prelude::{
    parse_unit_id, LifecycleCallbacks, LifecycleError, LifecycleStage, LogFormat, LoggingErrorSink, MemorySurface,
    ModuleExport, MountProps, PageContext, PageEvent, RegistryConfig, RenderSurface, StaticModuleLoader,
    StructuredLogger, TransitionMetrics,
};
use parking_lot::Mutex;
use serde::Serialize;

use super::SimulateArgs;
use crate::context::Context;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Serialize)]
struct Step {
    url: String,
    outcome: String,
    log: Vec<String>,
}

/// A fragment that records its lifecycle and writes its name into its slot.
fn stub_fragment(name: String, surface: Arc<MemorySurface>, log: Log, fail_mount: bool) -> ModuleExport {
    ModuleExport::factory(move |_| {
        let stage = |verb: &'static str| {
            let name = name.clone();
            let surface = surface.clone();
            let log = log.clone();
            LifecycleStage::from_fn(move |props: MountProps| {
                let name = name.clone();
                let surface = surface.clone();
                let log = log.clone();
                async move {
                    log.lock()
                        .push(format!("{} {}@{} {}", verb, name, props.slot_name, props.props));
                    let slot = surface
                        .slot_element(&props.slot_name)
                        .ok_or_else(|| LifecycleError::failed(format!("slot {} missing", props.slot_name)))?;
                    match verb {
                        "mount" if fail_mount => Err(LifecycleError::failed("simulated mount failure")),
                        "mount" => {
                            surface.append_text(slot, &name);
                            Ok(())
                        }
                        "unmount" => {
                            surface.clear_children(slot);
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            })
        };
        LifecycleCallbacks::new(stage("bootstrap"), stage("mount"), stage("unmount"))
    })
}

fn stub_modules(registry: &RegistryConfig, surface: &Arc<MemorySurface>, log: &Log, failing: &[String]) -> StaticModuleLoader {
    let modules = StaticModuleLoader::new();
    for (name, descriptor) in &registry.apps {
        if let Some(bundle) = &descriptor.spa_bundle {
            let fail = failing.iter().any(|f| f == name);
            modules.insert(bundle.clone(), stub_fragment(name.clone(), surface.clone(), log.clone(), fail));
        }
    }
    modules
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let registry = ctx.registry.clone();
    let log: Log = Arc::default();

    let surface = Arc::new(MemorySurface::new());
    let slots: BTreeSet<String> = registry.slot_pairs().into_iter().map(|(_, slot)| slot).collect();
    for slot in &slots {
        surface.add_slot(slot);
    }

    let modules = stub_modules(&registry, &surface, &log, &args.failing);
    let logger = StructuredLogger::new("simulation").with_format(if ctx.output.is_json() {
        LogFormat::Json
    } else {
        LogFormat::Human
    });
    let page = PageContext::builder(registry)
        .with_surface(surface)
        .with_modules(Arc::new(modules))
        .with_error_sink(Arc::new(LoggingErrorSink::new(logger)))
        .build()
        .context("Failed to build page context")?;

    let metrics = Arc::new(TransitionMetrics::new());
    metrics.attach(page.bus());
    let events = log.clone();
    page.bus().subscribe(move |event: &PageEvent| {
        let line = match event {
            PageEvent::RouteChanged { url, route_id, .. } => format!("event route-changed {} ({})", url, route_id),
            PageEvent::IntlChanged { locale } => format!("event intl-changed {}", locale),
            other => format!("event {}", other.name()),
        };
        events.lock().push(line);
    });

    let total = args.urls.len();
    let mut steps = Vec::with_capacity(total);
    for (index, url) in args.urls.iter().enumerate() {
        let outcome = if index == 0 {
            page.start(url).await.map(|_| "started".to_string())
        } else {
            page.navigate(url)
                .await
                .map(|moved| (if moved { "navigated" } else { "blocked by guard" }).to_string())
        };
        // Let scheduled redirects and follow-up cycles run.
        tokio::task::yield_now().await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => format!("failed: {}", e),
        };
        let entries = std::mem::take(&mut *log.lock());

        ctx.output.step(index + 1, total, &format!("{} {}", url, outcome));
        for entry in &entries {
            ctx.output.list_item(entry);
        }
        steps.push(Step {
            url: url.clone(),
            outcome,
            log: entries,
        });
    }

    let snapshot = metrics.snapshot();
    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "steps": steps, "metrics": snapshot }));
        return Ok(());
    }

    ctx.output.header("Final state");
    ctx.output.kv("route", &page.current_route().id);
    for unit in page.units() {
        if let Some((app, slot)) = parse_unit_id(unit) {
            if let Some(state) = page.state_of(app, slot) {
                ctx.output.kv(unit, &format!("{:?}", state));
            }
        }
    }
    ctx.output.kv("cycles", &snapshot.cycles.to_string());
    ctx.output.kv("route changes", &snapshot.route_changes.to_string());
    ctx.output.success("Simulation finished");

    Ok(())
}
