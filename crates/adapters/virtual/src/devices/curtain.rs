//! Virtual curtains: remember a position per device after a delay.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lumen_app::ports::ActuatorClient;
use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::rule::Action;

use crate::device_key;

/// Simulated curtain motors for every `virtual://` device.
///
/// A curtain can be made unreachable to exercise retry paths.
pub struct VirtualCurtains {
    latency: Duration,
    positions: Mutex<HashMap<String, u8>>,
    unreachable: Mutex<HashSet<String>>,
}

impl VirtualCurtains {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            positions: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    /// Last level reached by the curtain with `key`.
    pub fn position(&self, key: &str) -> Option<u8> {
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    /// Make the curtain with `key` refuse or accept connections.
    pub fn set_reachable(&self, key: &str, reachable: bool) {
        let mut unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reachable {
            unreachable.remove(key);
        } else {
            unreachable.insert(key.to_string());
        }
    }

    fn is_reachable(&self, key: &str) -> bool {
        !self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl ActuatorClient for VirtualCurtains {
    async fn send(&self, address: &str, action: Action) -> Result<CommandAck, CommandError> {
        let key = device_key(address)
            .ok_or_else(|| CommandError::Unreachable(format!("no virtual curtain at {address}")))?;
        if !self.is_reachable(key) {
            return Err(CommandError::Unreachable(format!("{key} is not responding")));
        }
        action
            .validate()
            .map_err(|err| CommandError::Rejected(err.to_string()))?;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let level = action.target_level();
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), level);
        tracing::debug!(curtain = key, level, "virtual curtain moved");
        Ok(CommandAck { level: Some(level) })
    }
}
