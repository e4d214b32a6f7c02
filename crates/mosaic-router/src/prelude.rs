//! Prelude for convenient imports.
//!
//! ```rust,ignore
//! use mosaic_router::prelude::*;
//! ```

pub use crate::{
    normalize_path, trailing_slash_redirect, PrefixLocalizer, RouteTable, RouterError, UrlLocalizer,
};
