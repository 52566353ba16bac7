//! Sensor poller: samples registered sensors into the telemetry store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use lumen_domain::device::DeviceKind;
use lumen_domain::reading::Reading;

use crate::ports::{DeviceRepository, SensorSource};
use crate::registry::DeviceRegistry;
use crate::telemetry::TelemetryStore;

/// Background collector for sensors that do not push their readings.
pub struct SensorPoller<R, S> {
    registry: Arc<DeviceRegistry<R>>,
    telemetry: Arc<TelemetryStore<R>>,
    source: S,
}

impl<R, S> SensorPoller<R, S>
where
    R: DeviceRepository + Send + Sync + 'static,
    S: SensorSource + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<DeviceRegistry<R>>,
        telemetry: Arc<TelemetryStore<R>>,
        source: S,
    ) -> Self {
        Self {
            registry,
            telemetry,
            source,
        }
    }

    /// Spawn the collection loop, polling every `interval`.
    pub fn start(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(self.run(interval))
    }

    async fn run(self, interval: Duration) {
        loop {
            let collected = self.poll_once().await;
            tracing::trace!(collected, "sensor poll complete");
            tokio::time::sleep(interval).await;
        }
    }

    /// Sample every registered sensor this source can reach once.
    ///
    /// A sensor that fails to answer or whose reading is rejected is logged
    /// and skipped. Returns the number of readings appended.
    pub async fn poll_once(&self) -> usize {
        let mut collected = 0;
        for device in self.registry.list_kind(DeviceKind::Sensor) {
            if !self.source.accepts(&device) {
                continue;
            }
            let value = match self.source.sample(&device).await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(device_id = %device.id, %err, "failed to sample sensor");
                    continue;
                }
            };
            let appended = match Reading::new(
                device.id.clone(),
                value,
                lumen_domain::time::now(),
                self.source.source(),
            ) {
                Ok(reading) => self.telemetry.append(reading).await,
                Err(err) => Err(err),
            };
            match appended {
                Ok(()) => collected += 1,
                Err(err) => tracing::warn!(device_id = %device.id, %err, "discarding sample"),
            }
        }
        collected
    }
}
