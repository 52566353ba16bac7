//! JSON REST handlers for automation rules and their evaluation status.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_app::rule_store::RuleStatus;
use lumen_domain::error::ValidationError;
use lumen_domain::id::{DeviceId, RuleId};
use lumen_domain::rule::{Action, Rule, Trigger};

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating or replacing a rule.
///
/// `id` is optional on create (one is generated) and, when present on
/// update, must match the path.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleRequest {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub source_device_id: String,
    pub trigger: Trigger,
    pub target_device_id: String,
    pub action: Action,
    pub release_action: Option<Action>,
    #[serde(default)]
    pub debounce_secs: u64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RuleRequest {
    fn into_rule(self, id: RuleId) -> Result<Rule, ApiError> {
        let mut builder = Rule::builder()
            .id(id)
            .name(self.name)
            .source(parse_id::<DeviceId>(&self.source_device_id)?)
            .trigger(self.trigger)
            .target(parse_id::<DeviceId>(&self.target_device_id)?)
            .action(self.action)
            .debounce_secs(self.debounce_secs)
            .enabled(self.enabled);
        if let Some(release) = self.release_action {
            builder = builder.release_action(release);
        }
        Ok(builder.build()?)
    }
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Created(Json<Rule>),
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

/// `GET /api/automation/rules`
pub async fn list<D, R>(State(state): State<AppState<D, R>>) -> Json<Vec<Rule>>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    Json(state.rule_service.list_rules())
}

/// `GET /api/automation/rules/:id`
pub async fn get<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
) -> Result<Json<Rule>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let rule_id: RuleId = parse_id(&id)?;
    Ok(Json(state.rule_service.get_rule(&rule_id)?))
}

/// `POST /api/automation/rules`
pub async fn create<D, R>(
    State(state): State<AppState<D, R>>,
    payload: Result<Json<RuleRequest>, JsonRejection>,
) -> Result<CreateResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let rule_id = match req.id.as_deref() {
        Some(raw) => parse_id(raw)?,
        None => RuleId::generate(),
    };
    let rule = req.into_rule(rule_id)?;
    let created = state.rule_service.create_rule(rule).await?;
    Ok(CreateResponse::Created(Json(created)))
}

/// `PUT /api/automation/rules/:id`
///
/// Replaces the definition; engaged state and firing timestamps are kept.
pub async fn update<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
    payload: Result<Json<RuleRequest>, JsonRejection>,
) -> Result<Json<Rule>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let rule_id: RuleId = parse_id(&id)?;
    if let Some(body_id) = req.id.as_deref()
        && body_id != rule_id.as_str()
    {
        return Err(ValidationError::InvalidIdentifier {
            value: body_id.to_string(),
            reason: "does not match the rule addressed by the path",
        }
        .into());
    }
    let rule = req.into_rule(rule_id)?;
    Ok(Json(state.rule_service.update_rule(rule).await?))
}

/// `DELETE /api/automation/rules/:id`
pub async fn delete<D, R>(
    State(state): State<AppState<D, R>>,
    Path(id): Path<String>,
) -> Result<DeleteResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let rule_id: RuleId = parse_id(&id)?;
    state.rule_service.delete_rule(&rule_id).await?;
    Ok(DeleteResponse::NoContent)
}

/// `GET /api/automation/status`
pub async fn status<D, R>(State(state): State<AppState<D, R>>) -> Json<Vec<RuleStatus>>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    Json(state.rule_service.status(lumen_domain::time::now()))
}
