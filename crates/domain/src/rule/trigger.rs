//! Trigger: a threshold predicate with a hysteresis band.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// When a rule engages and releases.
///
/// Engaging requires crossing the `engage` bound; releasing requires
/// crossing back past `release`, which sits on the other side of the band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Engages when the value rises above `engage`, releases below `release`.
    Above { engage: f64, release: f64 },
    /// Engages when the value drops below `engage`, releases above `release`.
    Below { engage: f64, release: f64 },
}

impl Trigger {
    /// Check that both bounds are finite and the band is not inverted.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonFiniteThreshold`] or
    /// [`ValidationError::InvertedHysteresis`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (engage, release) = self.bounds();
        if !engage.is_finite() {
            return Err(ValidationError::NonFiniteThreshold { field: "engage" });
        }
        if !release.is_finite() {
            return Err(ValidationError::NonFiniteThreshold { field: "release" });
        }
        let inverted = match self {
            Self::Above { .. } => release > engage,
            Self::Below { .. } => release < engage,
        };
        if inverted {
            return Err(ValidationError::InvertedHysteresis { engage, release });
        }
        Ok(())
    }

    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Above { engage, release } | Self::Below { engage, release } => {
                (engage, release)
            }
        }
    }

    /// Whether `value` is past the engage bound.
    #[must_use]
    pub fn engages(&self, value: f64) -> bool {
        match *self {
            Self::Above { engage, .. } => value > engage,
            Self::Below { engage, .. } => value < engage,
        }
    }

    /// Whether `value` is back past the release bound.
    #[must_use]
    pub fn releases(&self, value: f64) -> bool {
        match *self {
            Self::Above { release, .. } => value < release,
            Self::Below { release, .. } => value > release,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Above { engage, release } => write!(f, "above({engage}, release<{release})"),
            Self::Below { engage, release } => write!(f, "below({engage}, release>{release})"),
        }
    }
}
