//! Stub repositories and request helpers shared by handler tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lumen_app::dispatcher::{ActuationDispatcher, DispatcherConfig};
use lumen_app::ports::{ActuatorClient, DeviceRepository, RuleRepository};
use lumen_app::registry::DeviceRegistry;
use lumen_app::rule_store::RuleStore;
use lumen_app::services::curtain_service::CurtainService;
use lumen_app::services::rule_service::RuleService;
use lumen_app::telemetry::{TelemetryConfig, TelemetryStore};
use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::device::{Device, DeviceKind, StatusUpdate};
use lumen_domain::error::LumenError;
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Action, Rule, RuleState};
use lumen_domain::time::Timestamp;

use crate::state::AppState;

pub struct StubDeviceRepo;
pub struct StubRuleRepo;

impl DeviceRepository for StubDeviceRepo {
    async fn create(&self, device: Device) -> Result<Device, LumenError> {
        Ok(device)
    }
    async fn get_by_id(&self, _id: &DeviceId) -> Result<Option<Device>, LumenError> {
        Ok(None)
    }
    async fn get_all(&self) -> Result<Vec<Device>, LumenError> {
        Ok(vec![])
    }
    async fn update(&self, device: Device) -> Result<Device, LumenError> {
        Ok(device)
    }
    async fn record_status(
        &self,
        _id: &DeviceId,
        _update: StatusUpdate,
        _at: Timestamp,
    ) -> Result<bool, LumenError> {
        Ok(true)
    }
    async fn delete(&self, _id: &DeviceId) -> Result<(), LumenError> {
        Ok(())
    }
}

impl RuleRepository for StubRuleRepo {
    async fn create(&self, rule: Rule) -> Result<Rule, LumenError> {
        Ok(rule)
    }
    async fn get_by_id(&self, _id: &RuleId) -> Result<Option<Rule>, LumenError> {
        Ok(None)
    }
    async fn get_all(&self) -> Result<Vec<Rule>, LumenError> {
        Ok(vec![])
    }
    async fn update(&self, rule: Rule) -> Result<Rule, LumenError> {
        Ok(rule)
    }
    async fn save_state(&self, _id: &RuleId, _state: &RuleState) -> Result<(), LumenError> {
        Ok(())
    }
    async fn delete(&self, _id: &RuleId) -> Result<(), LumenError> {
        Ok(())
    }
}

/// Acknowledges every command except those sent to [`JAMMED`].
pub struct StubActuator;

pub const JAMMED: &str = "http://jammed.local";

impl ActuatorClient for StubActuator {
    async fn send(&self, address: &str, action: Action) -> Result<CommandAck, CommandError> {
        if address == JAMMED {
            return Err(CommandError::Rejected("motor jammed".to_string()));
        }
        Ok(CommandAck {
            level: Some(action.target_level()),
        })
    }
}

pub type TestState = AppState<StubDeviceRepo, StubRuleRepo>;

/// State with `sensor-1`, `curtain-1` and a jammed `curtain-2` registered
/// and a running dispatcher.
pub async fn state() -> TestState {
    let registry = Arc::new(DeviceRegistry::new(StubDeviceRepo));
    let devices = [
        ("sensor-1", DeviceKind::Sensor, "http://10.0.0.20"),
        ("curtain-1", DeviceKind::Actuator, "http://10.0.0.12"),
        ("curtain-2", DeviceKind::Actuator, JAMMED),
    ];
    for (id, kind, address) in devices {
        let device = Device::builder()
            .id(DeviceId::new(id).unwrap())
            .name(id)
            .kind(kind)
            .address(address)
            .build()
            .unwrap();
        registry.register(device).await.unwrap();
    }
    let telemetry = Arc::new(TelemetryStore::new(
        Arc::clone(&registry),
        TelemetryConfig::default(),
    ));
    let (dispatcher, _task) = ActuationDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&telemetry),
        StubActuator,
        DispatcherConfig::default(),
    )
    .start();
    let rules = Arc::new(RuleStore::new(StubRuleRepo));
    AppState::new(
        Arc::clone(&registry),
        telemetry,
        Arc::new(RuleService::new(Arc::clone(&registry), rules)),
        Arc::new(CurtainService::new(registry, dispatcher)),
    )
}

/// Send one request and decode the JSON response body (`Null` when empty).
pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
