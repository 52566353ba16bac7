//! Heartbeat watcher: marks silent devices offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use lumen_domain::device::DeviceStatus;
use lumen_domain::id::DeviceId;
use lumen_domain::time::{Timestamp, has_elapsed};

use crate::ports::DeviceRepository;
use crate::registry::{DeviceRegistry, StatusUpsert};

/// Periodically flips online devices to offline once they have not been
/// seen for `timeout`.
pub struct HeartbeatMonitor<R> {
    registry: Arc<DeviceRegistry<R>>,
    timeout: Duration,
}

impl<R> HeartbeatMonitor<R>
where
    R: DeviceRepository + Send + Sync + 'static,
{
    pub fn new(registry: Arc<DeviceRegistry<R>>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Spawn the watcher, sweeping every `interval`.
    pub fn start(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(self.run(interval))
    }

    async fn run(self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.sweep(lumen_domain::time::now()).await;
        }
    }

    /// Mark every online device last seen more than `timeout` before `now`
    /// as offline. Returns the devices that were marked.
    ///
    /// A device observed concurrently with a newer timestamp keeps its
    /// fresh status.
    pub async fn sweep(&self, now: Timestamp) -> Vec<DeviceId> {
        let silent: Vec<DeviceId> = self
            .registry
            .list()
            .into_iter()
            .filter(|device| device.status == DeviceStatus::Online)
            .filter(|device| {
                device
                    .last_seen
                    .is_none_or(|seen| has_elapsed(seen, now, self.timeout))
            })
            .map(|device| device.id)
            .collect();

        let mut marked = Vec::with_capacity(silent.len());
        for id in silent {
            match self
                .registry
                .upsert_status(&id, DeviceStatus::Offline, now)
                .await
            {
                Ok(StatusUpsert::Applied(_)) => {
                    tracing::info!(device_id = %id, "device missed heartbeat, marked offline");
                    marked.push(id);
                }
                Ok(StatusUpsert::Stale) => {}
                // Deleted since listing.
                Err(err) => tracing::debug!(device_id = %id, %err, "skipping heartbeat update"),
            }
        }
        marked
    }
}
