//! Slot effects.

use std::fmt;
use std::str::FromStr;

use crate::error::TransitionError;

/// What a routing decision does to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotEffect {
    /// Nothing visible changes.
    #[default]
    Default,
    /// New content will appear.
    Rendered,
    /// Current content will go away.
    Removed,
    /// Current content is replaced.
    Rerendered,
}

impl SlotEffect {
    /// Get the effect as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Rendered => "rendered",
            Self::Removed => "removed",
            Self::Rerendered => "rerendered",
        }
    }

    /// Whether the outgoing content is kept on screen as a copy.
    pub fn removes(&self) -> bool {
        matches!(self, Self::Removed | Self::Rerendered)
    }

    /// Whether the transition waits for new content.
    pub fn renders(&self) -> bool {
        matches!(self, Self::Rendered | Self::Rerendered)
    }
}

impl FromStr for SlotEffect {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "rendered" => Ok(Self::Rendered),
            "removed" => Ok(Self::Removed),
            "rerendered" => Ok(Self::Rerendered),
            other => Err(TransitionError::UnknownEffect(other.to_string())),
        }
    }
}

impl fmt::Display for SlotEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_effects() {
        for effect in [
            SlotEffect::Default,
            SlotEffect::Rendered,
            SlotEffect::Removed,
            SlotEffect::Rerendered,
        ] {
            assert_eq!(effect.as_str().parse::<SlotEffect>(), Ok(effect));
        }
    }

    #[test]
    fn test_parse_unknown_effect() {
        assert_eq!(
            "not-a-real-effect".parse::<SlotEffect>(),
            Err(TransitionError::UnknownEffect("not-a-real-effect".to_string()))
        );
    }

    #[test]
    fn test_rerendered_both_removes_and_renders() {
        assert!(SlotEffect::Rerendered.removes());
        assert!(SlotEffect::Rerendered.renders());
        assert!(!SlotEffect::Default.removes());
        assert!(!SlotEffect::Removed.renders());
    }
}
