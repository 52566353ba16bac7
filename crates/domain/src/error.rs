//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`LumenError`] via `#[from]`.

use crate::time::Timestamp;

/// Top-level error shared by the application and its adapters.
#[derive(Debug, thiserror::Error)]
pub enum LumenError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("rejected: {0}")]
    Rejected(#[from] RejectedReason),

    #[error("service unavailable: {0}")]
    Unavailable(&'static str),

    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

impl LumenError {
    /// Wrap any adapter error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Invariant violations detected on input records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("identifier {value:?} is invalid: {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("device {device_id} is not registered")]
    UnknownDeviceReference { device_id: String },

    #[error("address must not be empty")]
    EmptyAddress,

    #[error("threshold {field} must be a finite number")]
    NonFiniteThreshold { field: &'static str },

    #[error("release threshold {release} is on the wrong side of engage threshold {engage}")]
    InvertedHysteresis { engage: f64, release: f64 },

    #[error("level {0} is out of range 0..=100")]
    LevelOutOfRange(u8),

    #[error("rule source and target must be different devices")]
    SelfTargetingRule,

    #[error("debounce of {0}s exceeds the maximum of {max}s", max = crate::rule::MAX_DEBOUNCE_SECS)]
    DebounceTooLong(u64),

    #[error("device {device_id} is a {actual}, expected a {expected}")]
    WrongDeviceKind {
        device_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("reading value must be a finite number")]
    NonFiniteValue,

    #[error("limit must be greater than zero")]
    ZeroLimit,
}

/// An entity looked up by identifier does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Typed rejections returned synchronously by the telemetry store and the
/// device registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectedReason {
    #[error("device {device_id} is not registered for this operation")]
    UnknownDevice { device_id: String },

    #[error("timestamp {received} is not newer than latest stored {latest}")]
    StaleTimestamp {
        latest: Timestamp,
        received: Timestamp,
    },
}
