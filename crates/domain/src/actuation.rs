//! Actuation: intents produced by rule evaluation and their results.

use serde::{Deserialize, Serialize};

use crate::device::DeviceStatus;
use crate::id::{DeviceId, IntentId, RuleId};
use crate::rule::{Action, Edge};
use crate::time::Timestamp;

/// Reference to the reading that caused an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    pub device_id: DeviceId,
    pub timestamp: Timestamp,
}

/// A pending request to perform `action` on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuationIntent {
    pub id: IntentId,
    /// `None` for operator commands issued outside any rule.
    pub rule_id: Option<RuleId>,
    pub edge: Option<Edge>,
    pub target: DeviceId,
    pub action: Action,
    pub cause: Option<Cause>,
    pub created_at: Timestamp,
}

impl ActuationIntent {
    /// Intent emitted by a rule firing on a reading.
    #[must_use]
    pub fn from_rule(
        rule_id: RuleId,
        edge: Edge,
        target: DeviceId,
        action: Action,
        cause: Cause,
    ) -> Self {
        Self {
            id: IntentId::new(),
            rule_id: Some(rule_id),
            edge: Some(edge),
            target,
            action,
            cause: Some(cause),
            created_at: crate::time::now(),
        }
    }

    /// Intent issued directly by an operator.
    #[must_use]
    pub fn manual(target: DeviceId, action: Action) -> Self {
        Self {
            id: IntentId::new(),
            rule_id: None,
            edge: None,
            target,
            action,
            cause: None,
            created_at: crate::time::now(),
        }
    }
}

/// Why a single command attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command timed out")]
    Timeout,

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("command rejected by device: {0}")]
    Rejected(String),
}

impl CommandError {
    /// Timeouts and connectivity failures are worth retrying; rejections are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unreachable(_))
    }
}

/// Acknowledgement returned by a device that executed a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Position reported by the device, when it reports one.
    pub level: Option<u8>,
}

/// Final outcome of dispatching one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Success { level: u8 },
    /// The target is not a registered actuator; no attempt was made.
    UnknownDevice,
    /// The device rejected the command; not retried.
    PermanentFailure { reason: String },
    /// Every attempt failed transiently.
    Failure { reason: String },
    /// The overall dispatch ceiling elapsed.
    Timeout,
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of an intent, written back into the registry and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuationResult {
    pub intent_id: IntentId,
    pub rule_id: Option<RuleId>,
    pub target: DeviceId,
    pub action: Action,
    pub outcome: Outcome,
    /// Number of command attempts made, zero when the dispatch failed fast.
    pub attempts: u32,
    pub final_status: Option<DeviceStatus>,
    pub completed_at: Timestamp,
}

impl ActuationResult {
    #[must_use]
    pub fn new(intent: &ActuationIntent, outcome: Outcome, attempts: u32) -> Self {
        Self {
            intent_id: intent.id,
            rule_id: intent.rule_id.clone(),
            target: intent.target.clone(),
            action: intent.action,
            outcome,
            attempts,
            final_status: None,
            completed_at: crate::time::now(),
        }
    }

    #[must_use]
    pub fn with_final_status(mut self, status: DeviceStatus) -> Self {
        self.final_status = Some(status);
        self
    }

    /// Attempts beyond the first.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}
