//! Mosaic Runtime
//!
//! Drives fragment lifecycles on a page: decides which application is active
//! in which slot, loads and mounts them through a lifecycle scheduler, runs
//! navigation guards and exposes the page-level API.
//!
//! This crate provides:
//! - [`PageContext`]: one explicit context per page view
//! - [`ActivityEvaluator`]: per-slot activation decisions
//! - [`WrappedApp`]: wrapper/wrapped application state machine
//! - [`SlotReadiness`]: initial slot discovery and inline overrides
//! - [`GuardManager`]: navigation guard hooks
//! - [`Scheduler`]: reference [`LifecycleScheduler`]
//! - [`Registrar`]: registration of (application, slot) units
//! - [`NavigationRouter`]: route state and navigation

mod activation;
mod errors;
mod guard;
mod navigation;
mod page;
mod readiness;
mod registration;
mod routes;
mod scheduler;
mod wrapper;

pub use activation::*;
pub use errors::*;
pub use guard::*;
pub use navigation::*;
pub use page::*;
pub use readiness::*;
pub use registration::*;
pub use routes::*;
pub use scheduler::*;
pub use wrapper::*;
