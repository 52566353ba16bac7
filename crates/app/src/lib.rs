//! # lumen-app
//!
//! Application layer: shared state, background tasks and **port
//! definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `DeviceRepository` / `RuleRepository`: persistence
//!   - `ActuatorClient`: send a command to a curtain
//!   - `SensorSource`: sample a light sensor on demand
//! - Own the in-process state every request and task shares:
//!   - `DeviceRegistry`: device records and status
//!   - `TelemetryStore`: bounded reading history and live subscriptions
//!   - `RuleStore`: rules and their evaluation state
//! - Run the pipeline: `AutomationEngine` turns readings into intents,
//!   `ActuationDispatcher` executes them, `HeartbeatMonitor` and
//!   `SensorPoller` keep device status and readings flowing
//!
//! ## Dependency rule
//! Depends on `lumen-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod automation_engine;
pub mod dispatcher;
pub mod heartbeat;
pub mod poller;
pub mod ports;
pub mod registry;
pub mod rule_store;
pub mod services;
pub mod telemetry;

#[cfg(test)]
mod testing;
