//! Telemetry store: bounded, time-ordered reading buffers per device.
//!
//! `append` is the only mutation path. It validates the reading against the
//! [`DeviceRegistry`], enforces strictly increasing timestamps per device,
//! evicts the oldest entry past capacity and publishes the reading to every
//! matching subscriber before returning.
//!
//! Each subscriber gets its own bounded [`broadcast`] channel: a slow
//! subscriber loses its oldest undelivered readings instead of stalling
//! the producer.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use lumen_domain::device::StatusUpdate;
use lumen_domain::error::{LumenError, RejectedReason, ValidationError};
use lumen_domain::id::DeviceId;
use lumen_domain::reading::{Reading, ReadingSource, ReadingStats};

use crate::ports::DeviceRepository;
use crate::registry::DeviceRegistry;

/// Readings retained per device unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 100;
/// Undelivered readings buffered per subscriber before the oldest is dropped.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub capacity: usize,
    pub subscriber_buffer: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Which readings a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// Every device, written `*`.
    All,
    Device(DeviceId),
}

impl SubscriptionFilter {
    #[must_use]
    pub fn matches(&self, device_id: &DeviceId) -> bool {
        match self {
            Self::All => true,
            Self::Device(id) => id == device_id,
        }
    }
}

impl FromStr for SubscriptionFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(Self::All)
        } else {
            DeviceId::new(s).map(Self::Device)
        }
    }
}

/// Receiving end of a telemetry subscription.
///
/// Dropping it unsubscribes; the store prunes it on the next append.
pub struct Subscription {
    filter: SubscriptionFilter,
    receiver: broadcast::Receiver<Reading>,
}

impl Subscription {
    #[must_use]
    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Wait for the next reading.
    ///
    /// Readings dropped because this subscriber fell behind are logged and
    /// skipped. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Reading> {
        loop {
            match self.receiver.recv().await {
                Ok(reading) => return Some(reading),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, filter = ?self.filter, "subscriber lagged, oldest readings dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Hand over the raw channel, e.g. to wrap it in a stream.
    #[must_use]
    pub fn into_receiver(self) -> broadcast::Receiver<Reading> {
        self.receiver
    }
}

struct Subscriber {
    filter: SubscriptionFilter,
    sender: broadcast::Sender<Reading>,
}

#[derive(Default)]
struct Inner {
    buffers: HashMap<DeviceId, VecDeque<Reading>>,
    subscribers: Vec<Subscriber>,
}

/// Per-device ring buffers of recent readings with push subscriptions.
pub struct TelemetryStore<R> {
    registry: Arc<DeviceRegistry<R>>,
    config: TelemetryConfig,
    inner: Mutex<Inner>,
}

impl<R: DeviceRepository> TelemetryStore<R> {
    pub fn new(registry: Arc<DeviceRegistry<R>>, config: TelemetryConfig) -> Self {
        Self {
            registry,
            config: TelemetryConfig {
                capacity: config.capacity.max(1),
                subscriber_buffer: config.subscriber_buffer.max(1),
            },
            inner: Mutex::new(Inner::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> TelemetryConfig {
        self.config
    }

    /// Store a reading and publish it to subscribers.
    ///
    /// Sensor readings also mark their device online at the reading's
    /// timestamp.
    ///
    /// # Errors
    ///
    /// - [`RejectedReason::UnknownDevice`] when the device is not a
    ///   registered sensor (actuators accept synthetic readings only)
    /// - [`RejectedReason::StaleTimestamp`] when the timestamp is not
    ///   strictly newer than the latest stored one
    /// - [`ValidationError::NonFiniteValue`] for `NaN` or infinite values
    #[tracing::instrument(skip(self, reading), fields(device_id = %reading.device_id, value = reading.value))]
    pub async fn append(&self, reading: Reading) -> Result<(), LumenError> {
        let accepted = self.registry.get(&reading.device_id).is_some_and(|device| {
            device.is_sensor()
                || (device.is_actuator() && reading.source == ReadingSource::SyntheticFromActuation)
        });
        if !accepted {
            return Err(RejectedReason::UnknownDevice {
                device_id: reading.device_id.to_string(),
            }
            .into());
        }
        if !reading.value.is_finite() {
            return Err(ValidationError::NonFiniteValue.into());
        }

        let device_id = reading.device_id.clone();
        let timestamp = reading.timestamp;
        let touches_registry = reading.source != ReadingSource::SyntheticFromActuation;
        self.store_and_publish(reading)?;

        if touches_registry
            && let Err(err) = self
                .registry
                .upsert_status(&device_id, StatusUpdate::online(), timestamp)
                .await
        {
            tracing::warn!(%err, "failed to refresh device status");
        }
        Ok(())
    }

    fn store_and_publish(&self, reading: Reading) -> Result<(), LumenError> {
        let mut inner = self.lock();
        let buffer = inner
            .buffers
            .entry(reading.device_id.clone())
            .or_default();
        if let Some(latest) = buffer.back()
            && reading.timestamp <= latest.timestamp
        {
            return Err(RejectedReason::StaleTimestamp {
                latest: latest.timestamp,
                received: reading.timestamp,
            }
            .into());
        }
        buffer.push_back(reading.clone());
        while buffer.len() > self.config.capacity {
            buffer.pop_front();
        }

        inner
            .subscribers
            .retain(|subscriber| subscriber.sender.receiver_count() > 0);
        for subscriber in &inner.subscribers {
            if subscriber.filter.matches(&reading.device_id) {
                // Only fails without receivers, which were pruned above.
                let _ = subscriber.sender.send(reading.clone());
            }
        }
        Ok(())
    }

    /// Most recent reading of a device.
    pub fn latest(&self, device_id: &DeviceId) -> Option<Reading> {
        self.lock()
            .buffers
            .get(device_id)
            .and_then(|buffer| buffer.back().cloned())
    }

    /// Up to `limit` readings of a device, newest first.
    pub fn recent(&self, device_id: &DeviceId, limit: usize) -> Vec<Reading> {
        self.lock()
            .buffers
            .get(device_id)
            .map(|buffer| buffer.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Count, average, min, max and latest over the retained window.
    pub fn statistics(&self, device_id: &DeviceId) -> ReadingStats {
        let inner = self.lock();
        let readings = inner.buffers.get(device_id);
        ReadingStats::from_newest_first(readings.into_iter().flat_map(|buffer| buffer.iter().rev()))
    }

    /// Receive every reading appended from now on that matches `filter`.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let (sender, receiver) = broadcast::channel(self.config.subscriber_buffer);
        self.lock().subscribers.push(Subscriber {
            filter: filter.clone(),
            sender,
        });
        Subscription { filter, receiver }
    }

    /// Subscriptions that have not been pruned yet.
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.sender.receiver_count() > 0)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
