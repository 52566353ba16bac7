//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod automation;
#[allow(clippy::missing_errors_doc)]
pub mod curtains;
#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod light_sensor;

use std::str::FromStr;

use axum::Router;
use axum::routing::{get, post};

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_domain::error::ValidationError;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<D, R>() -> Router<AppState<D, R>>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    Router::new()
        // Telemetry
        .route("/light-sensor/collect", post(light_sensor::collect::<D, R>))
        .route("/light-sensor/stream", get(light_sensor::stream::<D, R>))
        .route("/light-sensor/{device_id}/data", get(light_sensor::data::<D, R>))
        .route(
            "/light-sensor/{device_id}/latest",
            get(light_sensor::latest::<D, R>),
        )
        .route(
            "/light-sensor/{device_id}/statistics",
            get(light_sensor::statistics::<D, R>),
        )
        // Devices
        .route(
            "/devices",
            get(devices::list::<D, R>).post(devices::create::<D, R>),
        )
        .route(
            "/devices/{id}",
            get(devices::get::<D, R>)
                .put(devices::update::<D, R>)
                .delete(devices::delete::<D, R>),
        )
        // Automation
        .route(
            "/automation/rules",
            get(automation::list::<D, R>).post(automation::create::<D, R>),
        )
        .route(
            "/automation/rules/{id}",
            get(automation::get::<D, R>)
                .put(automation::update::<D, R>)
                .delete(automation::delete::<D, R>),
        )
        .route("/automation/status", get(automation::status::<D, R>))
        // Curtains
        .route("/curtain", get(curtains::list::<D, R>))
        .route("/curtain/{id}", get(curtains::get::<D, R>))
        .route("/curtain/{id}/command", post(curtains::command::<D, R>))
}

/// Parse an identifier taken from the path.
fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ValidationError>,
{
    T::from_str(raw).map_err(ApiError::from)
}
