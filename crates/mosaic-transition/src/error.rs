//! Transition errors.

/// Error type for page transactions.
///
/// These indicate a caller bug and are not recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Page transaction without a slot name")]
    MissingSlotName,

    #[error("Unknown slot effect: {0}")]
    UnknownEffect(String),

    #[error("Slot not found on the page: {0}")]
    SlotNotFound(String),
}
