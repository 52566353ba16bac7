//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::device::{Device, DeviceKind, StatusUpdate};
use lumen_domain::error::{LumenError, NotFoundError};
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Action, Rule, RuleState, Trigger};
use lumen_domain::time::Timestamp;

use crate::ports::{ActuatorClient, DeviceRepository, RuleRepository};

pub fn sensor(id: &str) -> Device {
    Device::builder()
        .id(DeviceId::new(id).unwrap())
        .name(format!("Light sensor {id}"))
        .kind(DeviceKind::Sensor)
        .address(format!("virtual://{id}"))
        .build()
        .unwrap()
}

pub fn actuator(id: &str) -> Device {
    Device::builder()
        .id(DeviceId::new(id).unwrap())
        .name(format!("Curtain {id}"))
        .kind(DeviceKind::Actuator)
        .address(format!("virtual://{id}"))
        .build()
        .unwrap()
}

/// Close `target` above 800 lux, reopen below 600, 60 s debounce.
pub fn curtain_rule(id: &str, source: &str, target: &str) -> Rule {
    Rule::builder()
        .id(RuleId::new(id).unwrap())
        .name(format!("rule {id}"))
        .source(DeviceId::new(source).unwrap())
        .trigger(Trigger::Above {
            engage: 800.0,
            release: 600.0,
        })
        .target(DeviceId::new(target).unwrap())
        .action(Action::Close)
        .release_action(Action::Open)
        .debounce_secs(60)
        .build()
        .unwrap()
}

pub fn at(secs: i64) -> Timestamp {
    chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

// ── In-memory device repo ──────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDeviceRepo {
    devices: Mutex<HashMap<DeviceId, Device>>,
}

impl DeviceRepository for InMemoryDeviceRepo {
    async fn create(&self, device: Device) -> Result<Device, LumenError> {
        let mut devices = self.devices.lock().unwrap();
        devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn get_by_id(&self, id: &DeviceId) -> Result<Option<Device>, LumenError> {
        Ok(self.devices.lock().unwrap().get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Device>, LumenError> {
        Ok(self.devices.lock().unwrap().values().cloned().collect())
    }

    async fn update(&self, device: Device) -> Result<Device, LumenError> {
        let mut devices = self.devices.lock().unwrap();
        if !devices.contains_key(&device.id) {
            return Err(NotFoundError {
                entity: "Device",
                id: device.id.to_string(),
            }
            .into());
        }
        devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn record_status(
        &self,
        id: &DeviceId,
        update: StatusUpdate,
        at: Timestamp,
    ) -> Result<bool, LumenError> {
        let mut devices = self.devices.lock().unwrap();
        Ok(devices
            .get_mut(id)
            .is_some_and(|device| device.observe(update, at)))
    }

    async fn delete(&self, id: &DeviceId) -> Result<(), LumenError> {
        self.devices.lock().unwrap().remove(id);
        Ok(())
    }
}

// ── In-memory rule repo ────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryRuleRepo {
    rules: Mutex<Vec<Rule>>,
}

impl RuleRepository for InMemoryRuleRepo {
    async fn create(&self, rule: Rule) -> Result<Rule, LumenError> {
        self.rules.lock().unwrap().push(rule.clone());
        Ok(rule)
    }

    async fn get_by_id(&self, id: &RuleId) -> Result<Option<Rule>, LumenError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .cloned())
    }

    async fn get_all(&self) -> Result<Vec<Rule>, LumenError> {
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn update(&self, rule: Rule) -> Result<Rule, LumenError> {
        let mut rules = self.rules.lock().unwrap();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| NotFoundError {
                entity: "Rule",
                id: rule.id.to_string(),
            })?;
        slot.apply_definition(rule.clone());
        Ok(slot.clone())
    }

    async fn save_state(&self, id: &RuleId, state: &RuleState) -> Result<(), LumenError> {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| &r.id == id) {
            rule.state.engaged = state.engaged;
            rule.state.last_fired = rule.state.last_fired.max(state.last_fired);
            rule.state.last_released = rule.state.last_released.max(state.last_released);
        }
        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<(), LumenError> {
        self.rules.lock().unwrap().retain(|r| &r.id != id);
        Ok(())
    }
}

// ── Scripted actuator ──────────────────────────────────────────────

/// What the next command sent to a [`ScriptedActuator`] does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(CommandError),
    /// Never answers; only a timeout gets the caller out.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub address: String,
    pub action: Action,
    pub at: tokio::time::Instant,
}

/// Actuator fake that plays a script of outcomes and tracks concurrency.
#[derive(Default)]
pub struct ScriptedActuator {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    latency: Duration,
    in_flight: Mutex<HashMap<String, usize>>,
    max_per_address: AtomicUsize,
    total: AtomicUsize,
    max_total: AtomicUsize,
}

impl ScriptedActuator {
    pub fn with_script(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight_per_address(&self) -> usize {
        self.max_per_address.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_total(&self) -> usize {
        self.max_total.load(Ordering::SeqCst)
    }

    fn enter(&self, address: &str) -> InFlight<'_> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = in_flight.entry(address.to_string()).or_default();
        *count += 1;
        self.max_per_address.fetch_max(*count, Ordering::SeqCst);
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total.fetch_max(total, Ordering::SeqCst);
        InFlight {
            owner: self,
            address: address.to_string(),
        }
    }
}

struct InFlight<'a> {
    owner: &'a ScriptedActuator,
    address: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .owner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_flight.get_mut(&self.address) {
            *count -= 1;
        }
        self.owner.total.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ActuatorClient for ScriptedActuator {
    async fn send(&self, address: &str, action: Action) -> Result<CommandAck, CommandError> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed);
        self.calls.lock().unwrap().push(Call {
            address: address.to_string(),
            action,
            at: tokio::time::Instant::now(),
        });
        let _guard = self.enter(address);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match step {
            Step::Succeed => Ok(CommandAck {
                level: Some(action.target_level()),
            }),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}
