//! Shared application state for axum handlers.

use std::sync::Arc;

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_app::registry::DeviceRegistry;
use lumen_app::services::curtain_service::CurtainService;
use lumen_app::services::rule_service::RuleService;
use lumen_app::telemetry::TelemetryStore;

/// Application state shared across all axum handlers.
///
/// Generic over the device and rule repositories to avoid dynamic dispatch.
/// `Clone` is implemented manually so the repositories themselves do not
/// need to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<D, R> {
    pub registry: Arc<DeviceRegistry<D>>,
    pub telemetry: Arc<TelemetryStore<D>>,
    pub rule_service: Arc<RuleService<D, R>>,
    pub curtain_service: Arc<CurtainService<D>>,
}

impl<D, R> Clone for AppState<D, R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            telemetry: Arc::clone(&self.telemetry),
            rule_service: Arc::clone(&self.rule_service),
            curtain_service: Arc::clone(&self.curtain_service),
        }
    }
}

impl<D, R> AppState<D, R>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    /// Build the state from components already shared with background tasks.
    pub fn new(
        registry: Arc<DeviceRegistry<D>>,
        telemetry: Arc<TelemetryStore<D>>,
        rule_service: Arc<RuleService<D, R>>,
        curtain_service: Arc<CurtainService<D>>,
    ) -> Self {
        Self {
            registry,
            telemetry,
            rule_service,
            curtain_service,
        }
    }
}
