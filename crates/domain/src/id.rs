//! Typed identifier newtypes.
//!
//! Devices and rules are named by operators (`sensor-1`, `act-1`, `r1`), so
//! their identifiers are validated strings. Intents are generated by the
//! engine and use random UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of an operator supplied identifier.
pub const MAX_KEY_LEN: usize = 100;

fn check_key(value: &str) -> Result<(), ValidationError> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.len() > MAX_KEY_LEN {
        Some("must be at most 100 characters")
    } else if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        Some("may only contain ASCII letters, digits, '-', '_', '.' or ':'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ValidationError::InvalidIdentifier {
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

macro_rules! define_key {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            ///
            /// # Errors
            ///
            /// Returns [`ValidationError::InvalidIdentifier`] when the value is
            /// empty, too long or contains unsupported characters.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                check_key(&value)?;
                Ok(Self(value))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(
    /// Unique, stable identifier of a [`Device`](crate::device::Device).
    DeviceId
);

define_key!(
    /// Unique identifier of a [`Rule`](crate::rule::Rule).
    RuleId
);

impl RuleId {
    /// Generate an identifier for a rule created without one.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Identifier of an [`ActuationIntent`](crate::actuation::ActuationIntent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(uuid::Uuid);

impl Default for IntentId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl IntentId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
