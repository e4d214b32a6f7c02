//! Public SDK for the Mosaic fragment orchestrator.
//!
//! This crate re-exports all engine functionality:
//!
//! ```ignore
//! use mosaic_sdk::prelude::*;
//!
//! let config = RegistryConfig::load("registry.toml")?;
//! let logger = StructuredLogger::new("page-1");
//! let page = PageContext::builder(config)
//!     .with_error_sink(Arc::new(LoggingErrorSink::new(logger)))
//!     .build()?;
//!
//! page.start("/news/42").await?;
//! page.on_route_change(|change| println!("now on {}", change.url));
//! page.navigate("/").await?;
//! ```

pub use mosaic_core;
pub use mosaic_loader;
pub use mosaic_observability;
pub use mosaic_router;
pub use mosaic_runtime;
pub use mosaic_transition;

/// Prelude for convenient imports.
pub mod prelude {
    pub use mosaic_core::*;
    pub use mosaic_loader::*;
    pub use mosaic_observability::*;
    pub use mosaic_router::*;
    pub use mosaic_runtime::*;
    pub use mosaic_transition::*;
}
