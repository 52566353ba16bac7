//! Storage port: repository traits for persistence.
//!
//! The registry and the rule store keep the authoritative working copy in
//! memory; repositories only make it survive restarts.

use std::future::Future;

use lumen_domain::device::{Device, StatusUpdate};
use lumen_domain::error::LumenError;
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Rule, RuleState};
use lumen_domain::time::Timestamp;

/// Repository for persisting [`Device`]s.
pub trait DeviceRepository {
    /// Create a new device in storage.
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, LumenError>> + Send;

    /// Get a device by its identifier.
    fn get_by_id(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, LumenError>> + Send;

    /// Get all devices.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, LumenError>> + Send;

    /// Replace an existing device record.
    fn update(&self, device: Device) -> impl Future<Output = Result<Device, LumenError>> + Send;

    /// Record a status observation.
    ///
    /// Implementations must apply it only when `at` is newer than the stored
    /// last-seen timestamp and report whether it was applied.
    fn record_status(
        &self,
        id: &DeviceId,
        update: StatusUpdate,
        at: Timestamp,
    ) -> impl Future<Output = Result<bool, LumenError>> + Send;

    /// Delete a device by its identifier.
    fn delete(&self, id: &DeviceId) -> impl Future<Output = Result<(), LumenError>> + Send;
}

/// Repository for persisting [`Rule`]s.
pub trait RuleRepository {
    /// Create a new rule in storage.
    fn create(&self, rule: Rule) -> impl Future<Output = Result<Rule, LumenError>> + Send;

    /// Get a rule by its identifier.
    fn get_by_id(&self, id: &RuleId)
    -> impl Future<Output = Result<Option<Rule>, LumenError>> + Send;

    /// Get all rules, oldest first.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Rule>, LumenError>> + Send;

    /// Replace the definition of an existing rule.
    fn update(&self, rule: Rule) -> impl Future<Output = Result<Rule, LumenError>> + Send;

    /// Persist evaluation state.
    ///
    /// Implementations must never move `last_fired` or `last_released`
    /// backwards.
    fn save_state(
        &self,
        id: &RuleId,
        state: &RuleState,
    ) -> impl Future<Output = Result<(), LumenError>> + Send;

    /// Delete a rule by its identifier.
    fn delete(&self, id: &RuleId) -> impl Future<Output = Result<(), LumenError>> + Send;
}

impl<T: DeviceRepository + Send + Sync> DeviceRepository for std::sync::Arc<T> {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, LumenError>> + Send {
        (**self).create(device)
    }

    fn get_by_id(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, LumenError>> + Send {
        (**self).get_by_id(id)
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, LumenError>> + Send {
        (**self).get_all()
    }

    fn update(&self, device: Device) -> impl Future<Output = Result<Device, LumenError>> + Send {
        (**self).update(device)
    }

    fn record_status(
        &self,
        id: &DeviceId,
        update: StatusUpdate,
        at: Timestamp,
    ) -> impl Future<Output = Result<bool, LumenError>> + Send {
        (**self).record_status(id, update, at)
    }

    fn delete(&self, id: &DeviceId) -> impl Future<Output = Result<(), LumenError>> + Send {
        (**self).delete(id)
    }
}

impl<T: RuleRepository + Send + Sync> RuleRepository for std::sync::Arc<T> {
    fn create(&self, rule: Rule) -> impl Future<Output = Result<Rule, LumenError>> + Send {
        (**self).create(rule)
    }

    fn get_by_id(
        &self,
        id: &RuleId,
    ) -> impl Future<Output = Result<Option<Rule>, LumenError>> + Send {
        (**self).get_by_id(id)
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Rule>, LumenError>> + Send {
        (**self).get_all()
    }

    fn update(&self, rule: Rule) -> impl Future<Output = Result<Rule, LumenError>> + Send {
        (**self).update(rule)
    }

    fn save_state(
        &self,
        id: &RuleId,
        state: &RuleState,
    ) -> impl Future<Output = Result<(), LumenError>> + Send {
        (**self).save_state(id, state)
    }

    fn delete(&self, id: &RuleId) -> impl Future<Output = Result<(), LumenError>> + Send {
        (**self).delete(id)
    }
}
