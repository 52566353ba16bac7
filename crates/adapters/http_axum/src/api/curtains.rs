//! JSON REST handlers for curtains (actuators) and manual commands.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_domain::actuation::{ActuationResult, Outcome};
use lumen_domain::device::Device;
use lumen_domain::id::DeviceId;
use lumen_domain::rule::Action;

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a manual command.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandRequest {
    pub action: Action,
}

/// Possible responses from the command endpoint.
///
/// The body is the [`ActuationResult`] in every case.
pub enum CommandResponse {
    Done(Json<ActuationResult>),
    /// The target vanished before the dispatcher reached it.
    Gone(Json<ActuationResult>),
    /// The device rejected the command or never answered.
    Failed(Json<ActuationResult>),
}

impl From<ActuationResult> for CommandResponse {
    fn from(result: ActuationResult) -> Self {
        match result.outcome {
            Outcome::Success { .. } => Self::Done(Json(result)),
            Outcome::UnknownDevice => Self::Gone(Json(result)),
            Outcome::PermanentFailure { .. } | Outcome::Failure { .. } | Outcome::Timeout => {
                Self::Failed(Json(result))
            }
        }
    }
}

impl IntoResponse for CommandResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Done(json) => json.into_response(),
            Self::Gone(json) => (StatusCode::NOT_FOUND, json).into_response(),
            Self::Failed(json) => (StatusCode::BAD_GATEWAY, json).into_response(),
        }
    }
}

/// `GET /api/curtain`
pub async fn list<D, R>(State(state): State<AppState<D, R>>) -> Json<Vec<Device>>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    Json(state.curtain_service.list_curtains())
}

/// `GET /api/curtain/:id`
pub async fn get<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
) -> Result<Json<Device>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&id)?;
    Ok(Json(state.curtain_service.get_curtain(&device_id)?))
}

/// `POST /api/curtain/:id/command`
///
/// Waits for the dispatcher, so the response reflects every retry.
pub async fn command<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<CommandResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let device_id: DeviceId = parse_id(&id)?;
    let result = state
        .curtain_service
        .command(&device_id, req.action)
        .await?;
    Ok(result.into())
}
