//! Device registry: authoritative, internally synchronized device records.
//!
//! Records live in memory behind a [`RwLock`] so lookups from the engine and
//! dispatcher never touch storage. Every mutation is written through to the
//! [`DeviceRepository`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use lumen_domain::device::{Device, DeviceKind, StatusUpdate};
use lumen_domain::error::{LumenError, NotFoundError, RejectedReason, ValidationError};
use lumen_domain::id::DeviceId;
use lumen_domain::time::Timestamp;

use crate::ports::DeviceRepository;

/// Result of [`DeviceRegistry::upsert_status`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpsert {
    /// The observation was newer than last-seen and has been applied.
    Applied(Device),
    /// The observation was older than (or as old as) last-seen and was dropped.
    Stale,
}

/// Shared registry of sensors and actuators.
pub struct DeviceRegistry<R> {
    repo: R,
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl<R: DeviceRepository> DeviceRegistry<R> {
    /// Create an empty registry backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry populated with every device already persisted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the repository cannot be read.
    pub async fn load(repo: R) -> Result<Self, LumenError> {
        let devices = repo.get_all().await?;
        tracing::debug!(count = devices.len(), "loaded devices");
        let devices = devices
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();
        Ok(Self {
            repo,
            devices: RwLock::new(devices),
        })
    }

    /// Look up a device.
    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All devices ordered by identifier.
    pub fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Devices of one kind ordered by identifier.
    pub fn list_kind(&self, kind: DeviceKind) -> Vec<Device> {
        let mut devices = self.list();
        devices.retain(|device| device.kind == kind);
        devices
    }

    /// Look up a device, failing when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] when no device with `id` exists.
    pub fn require(&self, id: &DeviceId) -> Result<Device, LumenError> {
        self.get(id).ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Register a new device.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] if invariants fail or the
    /// identifier is taken, or a storage error from the repository.
    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    pub async fn register(&self, device: Device) -> Result<Device, LumenError> {
        device.validate()?;
        if self.get(&device.id).is_some() {
            return Err(ValidationError::Duplicate {
                entity: "Device",
                id: device.id.to_string(),
            }
            .into());
        }
        let device = self.repo.create(device).await?;
        self.write().insert(device.id.clone(), device.clone());
        tracing::info!(kind = %device.kind, address = %device.address, "device registered");
        Ok(device)
    }

    /// Replace the administrative fields of an existing device.
    ///
    /// Runtime state (status, last-seen, level) is kept from the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown device,
    /// [`LumenError::Validation`] if invariants fail, or a storage error.
    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    pub async fn update(&self, device: Device) -> Result<Device, LumenError> {
        device.validate()?;
        self.require(&device.id)?;
        let definition = self.repo.update(device).await?;
        // Status observations may have landed while the repository call was
        // pending: merge into the live record instead of replacing it.
        let mut devices = self.write();
        let live = devices
            .get_mut(&definition.id)
            .ok_or_else(|| NotFoundError {
                entity: "Device",
                id: definition.id.to_string(),
            })?;
        live.apply_definition(definition);
        Ok(live.clone())
    }

    /// Remove a device.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] for an unknown device, or a storage
    /// error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &DeviceId) -> Result<(), LumenError> {
        self.require(id)?;
        self.repo.delete(id).await?;
        self.write().remove(id);
        tracing::info!("device deleted");
        Ok(())
    }

    /// Record a status observation made at `at`.
    ///
    /// The observation is applied only when `at` is strictly newer than the
    /// device's last-seen timestamp; older observations are discarded. A
    /// failure to persist an applied observation is logged, the in-memory
    /// record stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`RejectedReason::UnknownDevice`] for an unregistered device.
    pub async fn upsert_status(
        &self,
        id: &DeviceId,
        update: impl Into<StatusUpdate>,
        at: Timestamp,
    ) -> Result<StatusUpsert, LumenError> {
        let update = update.into();
        let applied = {
            let mut devices = self.write();
            let device = devices
                .get_mut(id)
                .ok_or_else(|| RejectedReason::UnknownDevice {
                    device_id: id.to_string(),
                })?;
            if device.observe(update, at) {
                Some(device.clone())
            } else {
                None
            }
        };
        let Some(device) = applied else {
            tracing::debug!(device_id = %id, %at, "discarding stale status update");
            return Ok(StatusUpsert::Stale);
        };
        if let Err(err) = self.repo.record_status(id, update, at).await {
            tracing::warn!(device_id = %id, %err, "failed to persist device status");
        }
        Ok(StatusUpsert::Applied(device))
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DeviceId, Device>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use lumen_domain::device::DeviceStatus;

    use super::*;
    use crate::testing::{InMemoryDeviceRepo, actuator, sensor};

    #[tokio::test]
    async fn should_register_and_get_device() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());
        registry.register(sensor("sensor-1")).await.unwrap();

        let found = registry.get(&DeviceId::new("sensor-1").unwrap()).unwrap();
        assert!(found.is_sensor());
        assert_eq!(found.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn should_return_validation_error_when_registering_duplicate() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());
        registry.register(sensor("sensor-1")).await.unwrap();

        let result = registry.register(sensor("sensor-1")).await;

        assert!(matches!(
            result,
            Err(LumenError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn should_hydrate_from_repository_when_loading() {
        let repo = InMemoryDeviceRepo::default();
        repo.create(actuator("act-1")).await.unwrap();

        let registry = DeviceRegistry::load(repo).await.unwrap();

        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list_kind(DeviceKind::Actuator).len(), 1);
        assert!(registry.list_kind(DeviceKind::Sensor).is_empty());
    }

    #[tokio::test]
    async fn should_apply_status_when_newer_and_discard_when_stale() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());
        registry.register(actuator("act-1")).await.unwrap();
        let id = DeviceId::new("act-1").unwrap();
        let t0 = lumen_domain::time::now();

        let applied = registry
            .upsert_status(&id, StatusUpdate::online().with_level(0), t0)
            .await
            .unwrap();
        assert!(matches!(applied, StatusUpsert::Applied(ref d) if d.level == Some(0)));

        let stale = registry
            .upsert_status(&id, DeviceStatus::Offline, t0 - TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(stale, StatusUpsert::Stale);
        assert_eq!(registry.get(&id).unwrap().status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn should_persist_applied_status() {
        let repo = std::sync::Arc::new(InMemoryDeviceRepo::default());
        let registry = DeviceRegistry::new(std::sync::Arc::clone(&repo));
        registry.register(actuator("act-1")).await.unwrap();
        let id = DeviceId::new("act-1").unwrap();

        registry
            .upsert_status(&id, DeviceStatus::Error, lumen_domain::time::now())
            .await
            .unwrap();

        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeviceStatus::Error);
    }

    #[tokio::test]
    async fn should_reject_status_for_unknown_device() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());

        let result = registry
            .upsert_status(
                &DeviceId::new("ghost").unwrap(),
                DeviceStatus::Online,
                lumen_domain::time::now(),
            )
            .await;

        assert!(matches!(
            result,
            Err(LumenError::Rejected(RejectedReason::UnknownDevice { .. }))
        ));
    }

    #[tokio::test]
    async fn should_serialize_concurrent_status_updates_for_same_device() {
        let registry = std::sync::Arc::new(DeviceRegistry::new(InMemoryDeviceRepo::default()));
        registry.register(actuator("act-1")).await.unwrap();
        let id = DeviceId::new("act-1").unwrap();
        let t0 = lumen_domain::time::now();

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = std::sync::Arc::clone(&registry);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let level = u8::try_from(i).unwrap();
                registry
                    .upsert_status(
                        &id,
                        StatusUpdate::online().with_level(level),
                        t0 + TimeDelta::milliseconds(i64::from(level)),
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let device = registry.get(&id).unwrap();
        assert_eq!(device.level, Some(31));
        assert_eq!(device.last_seen, Some(t0 + TimeDelta::milliseconds(31)));
    }

    #[tokio::test]
    async fn should_keep_runtime_state_when_updating_metadata() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());
        registry.register(actuator("act-1")).await.unwrap();
        let id = DeviceId::new("act-1").unwrap();
        let t0 = lumen_domain::time::now();
        registry
            .upsert_status(&id, StatusUpdate::online().with_level(30), t0)
            .await
            .unwrap();

        let mut edited = actuator("act-1");
        edited.name = "Bedroom curtain".to_string();
        let updated = registry.update(edited).await.unwrap();

        assert_eq!(updated.name, "Bedroom curtain");
        assert_eq!(updated.status, DeviceStatus::Online);
        assert_eq!(updated.level, Some(30));
        assert_eq!(updated.last_seen, Some(t0));
    }

    /// Suspends once inside `update` so other registry calls interleave.
    #[derive(Default)]
    struct YieldingRepo(InMemoryDeviceRepo);

    impl DeviceRepository for YieldingRepo {
        async fn create(&self, device: Device) -> Result<Device, LumenError> {
            self.0.create(device).await
        }

        async fn get_by_id(&self, id: &DeviceId) -> Result<Option<Device>, LumenError> {
            self.0.get_by_id(id).await
        }

        async fn get_all(&self) -> Result<Vec<Device>, LumenError> {
            self.0.get_all().await
        }

        async fn update(&self, device: Device) -> Result<Device, LumenError> {
            tokio::task::yield_now().await;
            self.0.update(device).await
        }

        async fn record_status(
            &self,
            id: &DeviceId,
            update: StatusUpdate,
            at: Timestamp,
        ) -> Result<bool, LumenError> {
            self.0.record_status(id, update, at).await
        }

        async fn delete(&self, id: &DeviceId) -> Result<(), LumenError> {
            self.0.delete(id).await
        }
    }

    #[tokio::test]
    async fn should_keep_status_observed_while_metadata_update_is_pending() {
        let registry = DeviceRegistry::new(YieldingRepo::default());
        registry.register(actuator("act-1")).await.unwrap();
        let id = DeviceId::new("act-1").unwrap();
        let t0 = lumen_domain::time::now();
        registry
            .upsert_status(&id, StatusUpdate::online(), t0)
            .await
            .unwrap();
        let mut edited = actuator("act-1");
        edited.name = "Renamed".to_string();

        let (updated, observed) = tokio::join!(
            registry.update(edited),
            registry.upsert_status(&id, DeviceStatus::Error, t0 + TimeDelta::seconds(10)),
        );

        assert!(matches!(observed.unwrap(), StatusUpsert::Applied(_)));
        assert_eq!(updated.unwrap().status, DeviceStatus::Error);
        let device = registry.get(&id).unwrap();
        assert_eq!(device.name, "Renamed");
        assert_eq!(device.status, DeviceStatus::Error);
        assert_eq!(device.last_seen, Some(t0 + TimeDelta::seconds(10)));
    }

    #[tokio::test]
    async fn should_return_not_found_when_deleting_unknown_device() {
        let registry = DeviceRegistry::new(InMemoryDeviceRepo::default());
        let result = registry.delete(&DeviceId::new("ghost").unwrap()).await;
        assert!(matches!(result, Err(LumenError::NotFound(_))));
    }
}
