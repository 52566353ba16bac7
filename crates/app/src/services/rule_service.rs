//! Rule service: rule administration with device reference checks.

use std::sync::Arc;

use lumen_domain::device::DeviceKind;
use lumen_domain::error::{LumenError, NotFoundError, ValidationError};
use lumen_domain::id::RuleId;
use lumen_domain::rule::Rule;
use lumen_domain::time::Timestamp;

use crate::ports::{DeviceRepository, RuleRepository};
use crate::registry::DeviceRegistry;
use crate::rule_store::{RuleStatus, RuleStore};

/// Application service for automation rule CRUD.
pub struct RuleService<D, R> {
    registry: Arc<DeviceRegistry<D>>,
    rules: Arc<RuleStore<R>>,
}

impl<D, R> RuleService<D, R>
where
    D: DeviceRepository,
    R: RuleRepository,
{
    pub fn new(registry: Arc<DeviceRegistry<D>>, rules: Arc<RuleStore<R>>) -> Self {
        Self { registry, rules }
    }

    /// Create a rule after checking that it reads from a registered device
    /// and drives a registered actuator.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] for a malformed rule, a dangling
    /// device reference or a target that is not an actuator, or a storage
    /// error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn create_rule(&self, rule: Rule) -> Result<Rule, LumenError> {
        rule.validate()?;
        self.check_references(&rule)?;
        self.rules.create(rule).await
    }

    /// Look up a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] when no rule with `id` exists.
    pub fn get_rule(&self, id: &RuleId) -> Result<Rule, LumenError> {
        self.rules.get(id).ok_or_else(|| {
            NotFoundError {
                entity: "Rule",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// All rules in evaluation order.
    pub fn list_rules(&self) -> Vec<Rule> {
        self.rules.list()
    }

    /// Replace a rule's definition, keeping its evaluation state.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_rule`], plus [`LumenError::NotFound`] for an
    /// unknown rule.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, rule: Rule) -> Result<Rule, LumenError> {
        rule.validate()?;
        self.check_references(&rule)?;
        self.rules.update(rule).await
    }

    /// Delete a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown rule, or a storage
    /// error from the repository.
    pub async fn delete_rule(&self, id: &RuleId) -> Result<(), LumenError> {
        self.rules.delete(id).await
    }

    /// Evaluation state of every rule as of `now`.
    pub fn status(&self, now: Timestamp) -> Vec<RuleStatus> {
        self.rules.status(now)
    }

    fn check_references(&self, rule: &Rule) -> Result<(), LumenError> {
        if self.registry.get(&rule.source_device_id).is_none() {
            return Err(ValidationError::UnknownDeviceReference {
                device_id: rule.source_device_id.to_string(),
            }
            .into());
        }
        let target = self.registry.get(&rule.target_device_id).ok_or_else(|| {
            ValidationError::UnknownDeviceReference {
                device_id: rule.target_device_id.to_string(),
            }
        })?;
        if target.kind != DeviceKind::Actuator {
            return Err(ValidationError::WrongDeviceKind {
                device_id: target.id.to_string(),
                expected: DeviceKind::Actuator.as_str(),
                actual: target.kind.as_str(),
            }
            .into());
        }
        Ok(())
    }
}
