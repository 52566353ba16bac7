//! Rule store: rule definitions, their evaluation state and a per-device index.
//!
//! Rules are kept in memory behind a [`RwLock`] and written through to the
//! [`RuleRepository`]. The device index lists rule ids in creation order so
//! evaluation order is stable across restarts and edits.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use lumen_domain::actuation::ActuationResult;
use lumen_domain::error::{LumenError, NotFoundError, ValidationError};
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Edge, Rule, RuleState};
use lumen_domain::time::Timestamp;

use crate::ports::RuleRepository;

/// Evaluation snapshot of one rule for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatus {
    pub rule_id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub source_device_id: DeviceId,
    pub target_device_id: DeviceId,
    pub engaged: bool,
    pub cooling: bool,
    pub last_fired: Option<Timestamp>,
    pub last_released: Option<Timestamp>,
    pub last_result: Option<ActuationResult>,
}

struct Entry {
    order: u64,
    rule: Rule,
    last_result: Option<ActuationResult>,
}

#[derive(Default)]
struct Inner {
    rules: HashMap<RuleId, Entry>,
    by_device: HashMap<DeviceId, Vec<RuleId>>,
    next_order: u64,
}

impl Inner {
    fn insert(&mut self, rule: Rule) {
        let order = self.next_order;
        self.next_order += 1;
        self.index(&rule.source_device_id, &rule.id, order);
        self.rules.insert(
            rule.id.clone(),
            Entry {
                order,
                rule,
                last_result: None,
            },
        );
    }

    fn index(&mut self, device_id: &DeviceId, rule_id: &RuleId, order: u64) {
        let ids = self.by_device.entry(device_id.clone()).or_default();
        let position = ids
            .iter()
            .position(|id| self.rules.get(id).is_some_and(|entry| entry.order > order))
            .unwrap_or(ids.len());
        ids.insert(position, rule_id.clone());
    }

    fn unindex(&mut self, device_id: &DeviceId, rule_id: &RuleId) {
        if let Some(ids) = self.by_device.get_mut(device_id) {
            ids.retain(|id| id != rule_id);
            if ids.is_empty() {
                self.by_device.remove(device_id);
            }
        }
    }

    fn entry_mut(&mut self, id: &RuleId) -> Result<&mut Entry, LumenError> {
        self.rules.get_mut(id).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &RuleId) -> LumenError {
    NotFoundError {
        entity: "Rule",
        id: id.to_string(),
    }
    .into()
}

/// Shared store of automation rules.
pub struct RuleStore<R> {
    repo: R,
    inner: RwLock<Inner>,
}

impl<R: RuleRepository> RuleStore<R> {
    /// Create an empty store backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create a store populated with every persisted rule, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the repository cannot be read.
    pub async fn load(repo: R) -> Result<Self, LumenError> {
        let rules = repo.get_all().await?;
        tracing::debug!(count = rules.len(), "loaded rules");
        let mut inner = Inner::default();
        for rule in rules {
            inner.insert(rule);
        }
        Ok(Self {
            repo,
            inner: RwLock::new(inner),
        })
    }

    pub fn get(&self, id: &RuleId) -> Option<Rule> {
        self.read().rules.get(id).map(|entry| entry.rule.clone())
    }

    /// All rules in creation order.
    pub fn list(&self) -> Vec<Rule> {
        let inner = self.read();
        let mut entries: Vec<&Entry> = inner.rules.values().collect();
        entries.sort_by_key(|entry| entry.order);
        entries.into_iter().map(|entry| entry.rule.clone()).collect()
    }

    /// Rules whose source is `device_id`, in creation order.
    pub fn rules_for(&self, device_id: &DeviceId) -> Vec<Rule> {
        let inner = self.read();
        inner
            .by_device
            .get(device_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.rules.get(id))
            .map(|entry| entry.rule.clone())
            .collect()
    }

    /// Add a rule with fresh evaluation state.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] for a malformed rule or a taken
    /// identifier, or a storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn create(&self, mut rule: Rule) -> Result<Rule, LumenError> {
        rule.validate()?;
        if self.get(&rule.id).is_some() {
            return Err(ValidationError::Duplicate {
                entity: "Rule",
                id: rule.id.to_string(),
            }
            .into());
        }
        rule.state = RuleState::default();
        let rule = self.repo.create(rule).await?;
        self.write().insert(rule.clone());
        tracing::info!(source = %rule.source_device_id, target = %rule.target_device_id, "rule created");
        Ok(rule)
    }

    /// Replace a rule's definition, keeping its evaluation state and its
    /// position in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown rule,
    /// [`LumenError::Validation`] for a malformed one, or a storage error.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update(&self, rule: Rule) -> Result<Rule, LumenError> {
        rule.validate()?;
        let mut merged = self.get(&rule.id).ok_or_else(|| not_found(&rule.id))?;
        merged.apply_definition(rule);
        let merged = self.repo.update(merged).await?;

        let mut inner = self.write();
        let entry = inner.entry_mut(&merged.id)?;
        let order = entry.order;
        let previous_source = entry.rule.source_device_id.clone();
        entry.rule.apply_definition(merged.clone());
        if previous_source != merged.source_device_id {
            inner.unindex(&previous_source, &merged.id);
            inner.index(&merged.source_device_id, &merged.id, order);
        }
        let updated = inner.entry_mut(&merged.id)?.rule.clone();
        Ok(updated)
    }

    /// Remove a rule.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown rule or a storage
    /// error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &RuleId) -> Result<(), LumenError> {
        let source = self
            .get(id)
            .ok_or_else(|| not_found(id))?
            .source_device_id;
        self.repo.delete(id).await?;
        let mut inner = self.write();
        inner.rules.remove(id);
        inner.unindex(&source, id);
        Ok(())
    }

    /// Record that `edge` of a rule fired at `at`.
    ///
    /// Concurrent calls serialize on the store lock; a timestamp that is not
    /// later than the recorded one is ignored. Returns whether it was applied.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown rule. Persistence
    /// failures are logged.
    pub async fn mark_fired(
        &self,
        id: &RuleId,
        edge: Edge,
        at: Timestamp,
    ) -> Result<bool, LumenError> {
        let state = {
            let mut inner = self.write();
            let entry = inner.entry_mut(id)?;
            if !entry.rule.record_fired(edge, at) {
                return Ok(false);
            }
            entry.rule.state.clone()
        };
        self.persist_state(id, &state).await;
        Ok(true)
    }

    /// Commit the hysteresis flag computed by the engine.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown rule.
    pub async fn set_engaged(&self, id: &RuleId, engaged: bool) -> Result<(), LumenError> {
        let state = {
            let mut inner = self.write();
            let entry = inner.entry_mut(id)?;
            if entry.rule.state.engaged == engaged {
                return Ok(());
            }
            entry.rule.state.engaged = engaged;
            entry.rule.state.clone()
        };
        self.persist_state(id, &state).await;
        Ok(())
    }

    /// Remember the last dispatch result of a rule's intent.
    pub fn record_result(&self, result: &ActuationResult) {
        let Some(rule_id) = &result.rule_id else {
            return;
        };
        if let Some(entry) = self.write().rules.get_mut(rule_id) {
            entry.last_result = Some(result.clone());
        }
    }

    /// Evaluation state of every rule in creation order, judged at `now`.
    pub fn status(&self, now: Timestamp) -> Vec<RuleStatus> {
        let inner = self.read();
        let mut entries: Vec<&Entry> = inner.rules.values().collect();
        entries.sort_by_key(|entry| entry.order);
        entries
            .into_iter()
            .map(|entry| RuleStatus {
                rule_id: entry.rule.id.clone(),
                name: entry.rule.name.clone(),
                enabled: entry.rule.enabled,
                source_device_id: entry.rule.source_device_id.clone(),
                target_device_id: entry.rule.target_device_id.clone(),
                engaged: entry.rule.state.engaged,
                cooling: entry.rule.is_cooling(now),
                last_fired: entry.rule.state.last_fired,
                last_released: entry.rule.state.last_released,
                last_result: entry.last_result.clone(),
            })
            .collect()
    }

    async fn persist_state(&self, id: &RuleId, state: &RuleState) {
        if let Err(err) = self.repo.save_state(id, state).await {
            tracing::warn!(rule_id = %id, %err, "failed to persist rule state");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
