//! JSON REST handlers for devices.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_domain::device::{Device, DeviceBuilder, DeviceKind};
use lumen_domain::id::DeviceId;

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for registering a device.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateDeviceRequest {
    pub id: String,
    pub device_name: String,
    #[serde(default = "default_kind")]
    pub device_type_code: DeviceKind,
    pub ip_address: String,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub level: Option<u8>,
}

/// Request body for replacing a device's administrative fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDeviceRequest {
    pub device_name: String,
    #[serde(default = "default_kind")]
    pub device_type_code: DeviceKind,
    pub ip_address: String,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub level: Option<u8>,
}

fn default_kind() -> DeviceKind {
    DeviceKind::Sensor
}

impl UpdateDeviceRequest {
    fn into_builder(self, id: DeviceId) -> DeviceBuilder {
        let mut builder = Device::builder()
            .id(id)
            .name(self.device_name)
            .kind(self.device_type_code)
            .address(self.ip_address);
        if let Some(location) = self.location {
            builder = builder.location(location);
        }
        if let Some(manufacturer) = self.manufacturer {
            builder = builder.manufacturer(manufacturer);
        }
        if let Some(model) = self.model {
            builder = builder.model(model);
        }
        if let Some(level) = self.level {
            builder = builder.level(level);
        }
        builder
    }
}

impl CreateDeviceRequest {
    fn split(self) -> (String, UpdateDeviceRequest) {
        (
            self.id,
            UpdateDeviceRequest {
                device_name: self.device_name,
                device_type_code: self.device_type_code,
                ip_address: self.ip_address,
                location: self.location,
                manufacturer: self.manufacturer,
                model: self.model,
                level: self.level,
            },
        )
    }
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Created(Json<Device>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// Possible responses from the delete endpoint.
pub enum DeleteResponse {
    NoContent,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/devices`
pub async fn list<D, R>(State(state): State<AppState<D, R>>) -> Json<Vec<Device>>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    Json(state.registry.list())
}

/// `GET /api/devices/:id`
pub async fn get<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
) -> Result<Json<Device>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&id)?;
    Ok(Json(state.registry.require(&device_id)?))
}

/// `POST /api/devices`
pub async fn create<D, R>(
    State(state): State<AppState<D, R>>,
    payload: Result<Json<CreateDeviceRequest>, JsonRejection>,
) -> Result<CreateResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let (id, fields) = req.split();
    let device_id: DeviceId = parse_id(&id)?;
    let device = fields.into_builder(device_id).build()?;
    let created = state.registry.register(device).await?;
    Ok(CreateResponse::Created(Json(created)))
}

/// `PUT /api/devices/:id`
///
/// Status, last-seen and (unless given) level are kept from the stored record.
pub async fn update<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateDeviceRequest>, JsonRejection>,
) -> Result<Json<Device>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let device_id: DeviceId = parse_id(&id)?;
    let device = req.into_builder(device_id).build()?;
    Ok(Json(state.registry.update(device).await?))
}

/// `DELETE /api/devices/:id`
pub async fn delete<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
) -> Result<DeleteResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&id)?;
    state.registry.delete(&device_id).await?;
    Ok(DeleteResponse::NoContent)
}
