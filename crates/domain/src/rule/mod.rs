//! Rule: a threshold trigger on one device driving one actuator.
//!
//! A rule watches the readings of its source device. When the value
//! crosses the trigger's engage bound the rule fires its action at the
//! target actuator; once engaged it stays engaged until the value crosses
//! back past the release bound, which may fire an optional release action.
//! Each edge is debounced independently against the triggering reading's
//! timestamp.

mod action;
mod trigger;

pub use action::{Action, LEVEL_CLOSED, LEVEL_OPEN};
pub use trigger::Trigger;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LumenError, ValidationError};
use crate::id::{DeviceId, RuleId};
use crate::time::{Timestamp, has_elapsed};

/// Longest debounce window a rule may carry, in seconds.
pub const MAX_DEBOUNCE_SECS: u64 = i64::MAX.unsigned_abs();

/// Which side of the hysteresis band produced a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Engage,
    Release,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engage => f.write_str("engage"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// Evaluation state owned by the rule record and mutated only by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleState {
    pub engaged: bool,
    pub last_fired: Option<Timestamp>,
    pub last_released: Option<Timestamp>,
}

/// An automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub source_device_id: DeviceId,
    pub trigger: Trigger,
    pub target_device_id: DeviceId,
    pub action: Action,
    pub release_action: Option<Action>,
    pub debounce_secs: u64,
    pub enabled: bool,
    #[serde(default)]
    pub state: RuleState,
}

/// What evaluating one reading asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Emit an intent for `action` and record the firing for `edge`.
    Fire { edge: Edge, action: Action },
    /// The predicate held but the edge fired within its debounce window.
    Debounced { edge: Edge },
    /// Nothing to do.
    NoChange,
}

/// Outcome of [`Rule::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Engaged flag after this reading.
    pub engaged: bool,
    pub decision: Decision,
}

impl Rule {
    /// Create a builder for constructing a [`Rule`].
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - the trigger band is non-finite or inverted
    /// - an action level exceeds 100
    /// - the rule targets its own source device ([`ValidationError::SelfTargetingRule`])
    /// - `debounce_secs` exceeds [`MAX_DEBOUNCE_SECS`] ([`ValidationError::DebounceTooLong`])
    pub fn validate(&self) -> Result<(), LumenError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        self.trigger.validate()?;
        self.action.validate()?;
        if let Some(release) = &self.release_action {
            release.validate()?;
        }
        if self.source_device_id == self.target_device_id {
            return Err(ValidationError::SelfTargetingRule.into());
        }
        if self.debounce_secs > MAX_DEBOUNCE_SECS {
            return Err(ValidationError::DebounceTooLong(self.debounce_secs).into());
        }
        Ok(())
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Whether the engage edge fired less than one debounce window before `at`.
    #[must_use]
    pub fn is_cooling(&self, at: Timestamp) -> bool {
        self.state
            .last_fired
            .is_some_and(|fired| !has_elapsed(fired, at, self.debounce()))
    }

    fn edge_decision(&self, edge: Edge, action: Action, at: Timestamp) -> Decision {
        let last = match edge {
            Edge::Engage => self.state.last_fired,
            Edge::Release => self.state.last_released,
        };
        match last {
            Some(last) if !has_elapsed(last, at, self.debounce()) => Decision::Debounced { edge },
            _ => Decision::Fire { edge, action },
        }
    }

    /// Evaluate a reading taken at `at` against this rule.
    ///
    /// Does not mutate the rule: the caller commits `engaged` and, once the
    /// intent is accepted, the firing timestamp.
    ///
    /// A debounced edge leaves `engaged` untouched, so the first reading
    /// past the same bound after the window still fires.
    #[must_use]
    pub fn evaluate(&self, value: f64, at: Timestamp) -> Evaluation {
        if self.state.engaged && self.trigger.releases(value) {
            let decision = match self.release_action {
                Some(action) => self.edge_decision(Edge::Release, action, at),
                None => Decision::NoChange,
            };
            return Evaluation {
                engaged: matches!(decision, Decision::Debounced { .. }),
                decision,
            };
        }
        if self.trigger.engages(value) {
            let decision = self.edge_decision(Edge::Engage, self.action, at);
            return Evaluation {
                engaged: match decision {
                    Decision::Debounced { .. } => self.state.engaged,
                    _ => true,
                },
                decision,
            };
        }
        Evaluation {
            engaged: self.state.engaged,
            decision: Decision::NoChange,
        }
    }

    /// Record a firing of `edge` at `at`.
    ///
    /// Returns `false` when an equal or later firing is already recorded.
    pub fn record_fired(&mut self, edge: Edge, at: Timestamp) -> bool {
        let slot = match edge {
            Edge::Engage => &mut self.state.last_fired,
            Edge::Release => &mut self.state.last_released,
        };
        if slot.is_some_and(|current| current >= at) {
            return false;
        }
        *slot = Some(at);
        true
    }

    /// Replace the administrator-owned fields, keeping evaluation state.
    pub fn apply_definition(&mut self, other: Rule) {
        let state = std::mem::take(&mut self.state);
        *self = Rule { state, ..other };
    }
}

/// Step-by-step builder for [`Rule`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    source_device_id: Option<DeviceId>,
    trigger: Option<Trigger>,
    target_device_id: Option<DeviceId>,
    action: Option<Action>,
    release_action: Option<Action>,
    debounce_secs: u64,
    enabled: Option<bool>,
}

impl RuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn source(mut self, device_id: DeviceId) -> Self {
        self.source_device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn target(mut self, device_id: DeviceId) -> Self {
        self.target_device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn release_action(mut self, action: Action) -> Self {
        self.release_action = Some(action);
        self
    }

    #[must_use]
    pub fn debounce_secs(mut self, secs: u64) -> Self {
        self.debounce_secs = secs;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Consume the builder, validate, and return a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] if a required field is missing or
    /// the rule breaks an invariant.
    pub fn build(self) -> Result<Rule, LumenError> {
        let rule = Rule {
            id: self.id.ok_or(ValidationError::MissingField { field: "id" })?,
            name: self.name.unwrap_or_default(),
            source_device_id: self
                .source_device_id
                .ok_or(ValidationError::MissingField { field: "sourceDeviceId" })?,
            trigger: self
                .trigger
                .ok_or(ValidationError::MissingField { field: "trigger" })?,
            target_device_id: self
                .target_device_id
                .ok_or(ValidationError::MissingField { field: "targetDeviceId" })?,
            action: self
                .action
                .ok_or(ValidationError::MissingField { field: "action" })?,
            release_action: self.release_action,
            debounce_secs: self.debounce_secs,
            enabled: self.enabled.unwrap_or(true),
            state: RuleState::default(),
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn at(secs: i64) -> Timestamp {
        chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn curtain_rule() -> Rule {
        Rule::builder()
            .id(RuleId::new("r1").unwrap())
            .name("Close curtain on bright light")
            .source(DeviceId::new("sensor-1").unwrap())
            .trigger(Trigger::Above {
                engage: 800.0,
                release: 600.0,
            })
            .target(DeviceId::new("act-1").unwrap())
            .action(Action::Close)
            .release_action(Action::Open)
            .debounce_secs(60)
            .build()
            .unwrap()
    }

    /// Evaluate and commit the way the engine does.
    fn step(rule: &mut Rule, value: f64, t: Timestamp) -> Decision {
        let evaluation = rule.evaluate(value, t);
        rule.state.engaged = evaluation.engaged;
        if let Decision::Fire { edge, .. } = evaluation.decision {
            rule.record_fired(edge, t);
        }
        evaluation.decision
    }

    #[test]
    fn should_build_enabled_rule_with_idle_state() {
        let rule = curtain_rule();
        assert!(rule.enabled);
        assert_eq!(rule.state, RuleState::default());
        assert!(!rule.is_cooling(at(0)));
    }

    #[test]
    fn should_return_validation_error_when_trigger_missing() {
        let result = Rule::builder()
            .id(RuleId::new("r1").unwrap())
            .name("No trigger")
            .source(DeviceId::new("sensor-1").unwrap())
            .target(DeviceId::new("act-1").unwrap())
            .action(Action::Open)
            .build();
        assert!(matches!(
            result,
            Err(LumenError::Validation(ValidationError::MissingField {
                field: "trigger"
            }))
        ));
    }

    #[test]
    fn should_return_validation_error_when_rule_targets_its_source() {
        let device = DeviceId::new("act-1").unwrap();
        let result = Rule::builder()
            .id(RuleId::new("loop").unwrap())
            .name("Loop")
            .source(device.clone())
            .target(device)
            .trigger(Trigger::Above {
                engage: 50.0,
                release: 40.0,
            })
            .action(Action::Close)
            .build();
        assert!(matches!(
            result,
            Err(LumenError::Validation(ValidationError::SelfTargetingRule))
        ));
    }

    #[test]
    fn should_return_validation_error_when_debounce_exceeds_maximum() {
        let mut rule = curtain_rule();
        rule.debounce_secs = MAX_DEBOUNCE_SECS;
        assert!(rule.validate().is_ok());

        rule.debounce_secs = u64::MAX;
        assert!(matches!(
            rule.validate(),
            Err(LumenError::Validation(ValidationError::DebounceTooLong(u64::MAX)))
        ));
    }

    #[test]
    fn should_fire_engage_action_when_crossing_engage_threshold() {
        let rule = curtain_rule();
        assert_eq!(
            rule.evaluate(750.0, at(0)).decision,
            Decision::NoChange
        );
        let evaluation = rule.evaluate(850.0, at(0));
        assert!(evaluation.engaged);
        assert_eq!(
            evaluation.decision,
            Decision::Fire {
                edge: Edge::Engage,
                action: Action::Close
            }
        );
    }

    #[test]
    fn should_debounce_engage_until_window_elapsed() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));

        assert!(rule.is_cooling(at(59)));
        assert_eq!(
            step(&mut rule, 900.0, at(59)),
            Decision::Debounced { edge: Edge::Engage }
        );
        assert!(!rule.is_cooling(at(60)));
        assert!(matches!(
            step(&mut rule, 900.0, at(60)),
            Decision::Fire {
                edge: Edge::Engage,
                ..
            }
        ));
    }

    #[test]
    fn should_not_reengage_when_oscillating_inside_band() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));

        for (i, value) in [790.0, 700.0, 799.0, 610.0, 800.0].into_iter().enumerate() {
            let t = at(100 + i64::try_from(i).unwrap() * 100);
            assert_eq!(step(&mut rule, value, t), Decision::NoChange);
            assert!(rule.state.engaged);
        }
    }

    #[test]
    fn should_release_only_after_dropping_below_release_bound() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));

        assert_eq!(step(&mut rule, 650.0, at(5)), Decision::NoChange);
        assert_eq!(
            step(&mut rule, 500.0, at(10)),
            Decision::Fire {
                edge: Edge::Release,
                action: Action::Open
            }
        );
        assert!(!rule.state.engaged);
        assert_eq!(rule.state.last_released, Some(at(10)));
    }

    #[test]
    fn should_stay_engaged_when_release_is_debounced_and_release_after_window() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));
        step(&mut rule, 500.0, at(10));
        assert!(matches!(
            step(&mut rule, 850.0, at(61)),
            Decision::Fire {
                edge: Edge::Engage,
                ..
            }
        ));

        assert_eq!(
            step(&mut rule, 500.0, at(65)),
            Decision::Debounced {
                edge: Edge::Release
            }
        );
        assert!(rule.state.engaged);

        assert_eq!(
            step(&mut rule, 500.0, at(200)),
            Decision::Fire {
                edge: Edge::Release,
                action: Action::Open
            }
        );
        assert!(!rule.state.engaged);
        assert_eq!(rule.state.last_released, Some(at(200)));
    }

    #[test]
    fn should_stay_disengaged_when_engage_is_debounced() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));
        step(&mut rule, 500.0, at(10));

        assert_eq!(
            step(&mut rule, 850.0, at(30)),
            Decision::Debounced { edge: Edge::Engage }
        );
        assert!(!rule.state.engaged);
        assert_eq!(step(&mut rule, 700.0, at(40)), Decision::NoChange);
        assert!(matches!(
            step(&mut rule, 850.0, at(60)),
            Decision::Fire {
                edge: Edge::Engage,
                action: Action::Close
            }
        ));
        assert!(rule.state.engaged);
    }

    #[test]
    fn should_release_silently_when_no_release_action() {
        let mut rule = curtain_rule();
        rule.release_action = None;
        step(&mut rule, 850.0, at(0));

        let evaluation = rule.evaluate(100.0, at(1));
        assert!(!evaluation.engaged);
        assert_eq!(evaluation.decision, Decision::NoChange);
    }

    #[test]
    fn should_record_fired_monotonically() {
        let mut rule = curtain_rule();
        assert!(rule.record_fired(Edge::Engage, at(10)));
        assert!(!rule.record_fired(Edge::Engage, at(5)));
        assert!(!rule.record_fired(Edge::Engage, at(10)));
        assert_eq!(rule.state.last_fired, Some(at(10)));
        assert!(rule.record_fired(Edge::Engage, at(10) + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn should_keep_state_when_applying_new_definition() {
        let mut rule = curtain_rule();
        step(&mut rule, 850.0, at(0));
        let mut edited = curtain_rule();
        edited.name = "Renamed".to_string();
        edited.debounce_secs = 5;

        rule.apply_definition(edited);

        assert_eq!(rule.name, "Renamed");
        assert_eq!(rule.debounce_secs, 5);
        assert!(rule.state.engaged);
        assert_eq!(rule.state.last_fired, Some(at(0)));
    }

    #[test]
    fn should_roundtrip_rule_through_serde_json() {
        let rule = curtain_rule();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["sourceDeviceId"], "sensor-1");
        assert_eq!(json["action"]["type"], "close");
        let parsed: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, rule);
    }
}
