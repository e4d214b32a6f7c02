//! Mosaic Transition
//!
//! Keeps the page visually stable while fragments swap. Outgoing slot content
//! is replaced by an inert copy, incoming content is observed until it is
//! meaningful, and a spinner covers transitions that take too long.
//!
//! This crate provides:
//! - [`TransitionCoordinator`]: the blocker set and settle protocol
//! - [`SlotEffect`]: what a routing decision does to a slot
//! - [`TransitionError`]: rejected page transactions

mod coordinator;
mod effect;
mod error;
mod spinner;

pub use coordinator::*;
pub use effect::*;
pub use error::*;
pub use spinner::*;
