//! Action: what a rule asks an actuator to do.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Level reported for a fully open actuator.
pub const LEVEL_OPEN: u8 = 100;
/// Level reported for a fully closed actuator.
pub const LEVEL_CLOSED: u8 = 0;

/// A command for a curtain-like actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Open,
    Close,
    /// Move to an intermediate position, 0 (closed) to 100 (open).
    SetLevel { level: u8 },
}

impl Action {
    /// # Errors
    ///
    /// Returns [`ValidationError::LevelOutOfRange`] for levels above 100.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Self::SetLevel { level } if level > LEVEL_OPEN => {
                Err(ValidationError::LevelOutOfRange(level))
            }
            _ => Ok(()),
        }
    }

    /// Position the actuator ends up in once the action succeeds.
    #[must_use]
    pub fn target_level(self) -> u8 {
        match self {
            Self::Open => LEVEL_OPEN,
            Self::Close => LEVEL_CLOSED,
            Self::SetLevel { level } => level,
        }
    }

    /// Command name on the device wire protocol.
    #[must_use]
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::SetLevel { .. } => "set_level",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
            Self::SetLevel { level } => write!(f, "set_level({level})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_actions_to_target_levels() {
        assert_eq!(Action::Open.target_level(), 100);
        assert_eq!(Action::Close.target_level(), 0);
        assert_eq!(Action::SetLevel { level: 35 }.target_level(), 35);
    }

    #[test]
    fn should_reject_set_level_when_above_hundred() {
        assert_eq!(
            Action::SetLevel { level: 150 }.validate(),
            Err(ValidationError::LevelOutOfRange(150))
        );
    }

    #[test]
    fn should_display_set_level_action() {
        assert_eq!(Action::SetLevel { level: 40 }.to_string(), "set_level(40)");
    }
}
