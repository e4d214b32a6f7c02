//! Core abstractions for the Mosaic fragment orchestrator.
//!
//! This crate provides the shared vocabulary every other crate speaks:
//! - `RegistryConfig` / `Settings` - Route table, app descriptors and settings
//! - `Route` / `RouteDef` - Route definitions and matched routes
//! - `LifecycleCallbacks` - Bootstrap/mount/unmount stages of a fragment
//! - `PageEventBus` - Typed page-wide publish/subscribe
//! - `RenderSurface` - The rendering surface the engine manipulates
//! - `ErrorSink` - Where classified errors are reported

mod config;
mod descriptor;
mod events;
mod lifecycle;
mod memory;
mod props;
mod route;
mod sink;
mod surface;

pub use config::*;
pub use descriptor::*;
pub use events::*;
pub use lifecycle::*;
pub use memory::*;
pub use props::*;
pub use route::*;
pub use sink::*;
pub use surface::*;
