//! Curtain service: operator view of actuators and manual commands.

use std::sync::Arc;

use lumen_domain::actuation::{ActuationIntent, ActuationResult};
use lumen_domain::device::{Device, DeviceKind};
use lumen_domain::error::{LumenError, NotFoundError};
use lumen_domain::id::DeviceId;
use lumen_domain::rule::Action;

use crate::dispatcher::DispatcherHandle;
use crate::ports::DeviceRepository;
use crate::registry::DeviceRegistry;

pub struct CurtainService<R> {
    registry: Arc<DeviceRegistry<R>>,
    dispatcher: DispatcherHandle,
}

impl<R: DeviceRepository> CurtainService<R> {
    pub fn new(registry: Arc<DeviceRegistry<R>>, dispatcher: DispatcherHandle) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// All actuators with their last known level.
    pub fn list_curtains(&self) -> Vec<Device> {
        self.registry.list_kind(DeviceKind::Actuator)
    }

    /// Look up an actuator.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::NotFound`] when `id` is unknown or not an actuator.
    pub fn get_curtain(&self, id: &DeviceId) -> Result<Device, LumenError> {
        self.registry
            .get(id)
            .filter(Device::is_actuator)
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Curtain",
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// Run an operator command through the dispatcher and wait for its result.
    ///
    /// The command queues behind any rule intents already pending for the
    /// same curtain.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] for an out-of-range level,
    /// [`LumenError::NotFound`] for an unknown curtain, or
    /// [`LumenError::Unavailable`] if the dispatcher has stopped.
    #[tracing::instrument(skip(self))]
    pub async fn command(
        &self,
        id: &DeviceId,
        action: Action,
    ) -> Result<ActuationResult, LumenError> {
        action.validate()?;
        let curtain = self.get_curtain(id)?;
        let result = self
            .dispatcher
            .execute(ActuationIntent::manual(curtain.id, action))
            .await?;
        tracing::info!(outcome = ?result.outcome, attempts = result.attempts, "manual command finished");
        Ok(result)
    }
}
