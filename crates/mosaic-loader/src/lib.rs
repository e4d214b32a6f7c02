//! Mosaic Loader
//!
//! Resolves application names to lifecycle callbacks.
//!
//! This crate provides:
//! - [`ModuleLoader`]: the seam to the module-loading substrate
//! - [`BundleLoader`]: memoized, retrying bundle loads
//! - [`CssTracker`]: reference-counted stylesheet links
//! - [`RetryPolicy`] / [`BackoffStrategy`]: bounded retry of transient failures

mod bundle;
mod css;
mod module;
mod retry;

pub use bundle::*;
pub use css::*;
pub use module::*;
pub use retry::*;
