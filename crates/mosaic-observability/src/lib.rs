//! Observability for Mosaic pages.
//!
//! This crate provides:
//! - `StructuredLogger` - Structured logging with page and fragment context
//! - `LoggingErrorSink` - `ErrorSink` writing classified errors to the log
//! - `TransitionMetrics` - Route transition timings collected from the page bus

mod logging;
mod metrics;
mod sink;

pub use logging::*;
pub use metrics::*;
pub use sink::*;
