//! Route resolution for the Mosaic fragment orchestrator.
//!
//! Routes are matched in table order. A route flagged `next` contributes its
//! slots and lets matching continue, so shared slots (header, footer) can be
//! declared once:
//!
//! ```text
//! *          next   -> navbar, footer
//! /news/*           -> body: news
//! /                 -> body: home
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mosaic_router::RouteTable;
//!
//! let table = RouteTable::from_registry(&registry)?;
//! let route = table.match_url("/news/42?ref=home")?;
//! assert_eq!(route.slot("body").unwrap().app, "news");
//! ```

mod error;
mod localizer;
mod pattern;
mod table;
mod url;

pub mod prelude;

pub use error::*;
pub use localizer::*;
pub use pattern::*;
pub use table::*;
pub use url::*;
