//! JSON REST handlers for light sensor telemetry, plus the live SSE stream.

use std::str::FromStr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use lumen_app::ports::{DeviceRepository, RuleRepository};
use lumen_app::telemetry::SubscriptionFilter;
use lumen_domain::error::{LumenError, NotFoundError, ValidationError};
use lumen_domain::id::DeviceId;
use lumen_domain::reading::{Reading, ReadingSource, ReadingStats};

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Readings returned by `data` when no limit is given.
pub const DEFAULT_LIMIT: usize = 100;

/// Request body for pushing a reading.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectRequest {
    pub device_id: String,
    pub light_value: f64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct DataQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// A device id, or `*` / absent for every device.
    pub device_id: Option<String>,
}

/// Possible responses from the collect endpoint.
pub enum CollectResponse {
    Accepted(Json<Reading>),
}

impl IntoResponse for CollectResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/light-sensor/collect`
///
/// Stamps the reading with the current time and appends it to telemetry,
/// which also refreshes the sensor's status and wakes the automation engine.
pub async fn collect<D, R>(
    State(state): State<AppState<D, R>>,
    payload: Result<Json<CollectRequest>, JsonRejection>,
) -> Result<CollectResponse, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let device_id: DeviceId = parse_id(&req.device_id)?;
    let mut reading = Reading::new(
        device_id,
        req.light_value,
        lumen_domain::time::now(),
        ReadingSource::Hardware,
    )?;
    if let Some(metadata) = req.metadata {
        reading = reading.with_metadata(metadata);
    }
    state.telemetry.append(reading.clone()).await?;
    Ok(CollectResponse::Accepted(Json(reading)))
}

/// `GET /api/light-sensor/:device_id/data?limit=N`
///
/// Newest first.
pub async fn data<D, R>(
    State(state): State<AppState<D, R>>,
    Path(device_id): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Json<Vec<Reading>>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&device_id)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ValidationError::ZeroLimit.into());
    }
    state.registry.require(&device_id)?;
    Ok(Json(state.telemetry.recent(&device_id, limit)))
}

/// `GET /api/light-sensor/:device_id/latest`
pub async fn latest<D, R>(
    State(state): State<AppState<D, R>>,
    Path(device_id): Path<String>,
) -> Result<Json<Reading>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&device_id)?;
    let reading = state.telemetry.latest(&device_id).ok_or_else(|| {
        LumenError::from(NotFoundError {
            entity: "Reading",
            id: device_id.to_string(),
        })
    })?;
    Ok(Json(reading))
}

/// `GET /api/light-sensor/:device_id/statistics`
pub async fn statistics<D, R>(
    State(state): State<AppState<D, R>>,
    Path(device_id): Path<String>,
) -> Result<Json<ReadingStats>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let device_id: DeviceId = parse_id(&device_id)?;
    state.registry.require(&device_id)?;
    Ok(Json(state.telemetry.statistics(&device_id)))
}

/// `GET /api/light-sensor/stream?deviceId=`: SSE stream of new readings.
///
/// Each accepted reading is sent as a JSON `data:` frame. A client that
/// falls behind loses its oldest undelivered readings; the stream ends when
/// the client disconnects.
pub async fn stream<D, R>(
    State(state): State<AppState<D, R>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError>
where
    D: DeviceRepository + Send + Sync + 'static,
    R: RuleRepository + Send + Sync + 'static,
{
    let filter = SubscriptionFilter::from_str(query.device_id.as_deref().unwrap_or("*"))?;
    tracing::debug!(?filter, "opening reading stream");
    let receiver = state.telemetry.subscribe(filter).into_receiver();
    let readings = BroadcastStream::new(receiver).filter_map(|result| match result {
        Ok(reading) => match serde_json::to_string(&reading) {
            Ok(json) => Some(Ok(Event::default().event("reading").data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize reading for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE subscriber lagged, some readings were dropped");
            None
        }
    });

    Ok(Sse::new(readings).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::router;
    use crate::testing::{self, send};

    #[tokio::test]
    async fn should_accept_reading_and_return_it_when_sensor_registered() {
        let state = testing::state().await;
        let app = router::build(state.clone());

        let (status, body) = send(
            app,
            "POST",
            "/api/light-sensor/collect",
            Some(json!({"deviceId": "sensor-1", "lightValue": 420.5, "metadata": {"room": "kitchen"}})),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["deviceId"], "sensor-1");
        assert_eq!(body["lightValue"], 420.5);
        assert_eq!(body["dataSource"], "hardware");
        assert_eq!(body["metadata"]["room"], "kitchen");
        let id = DeviceId::new("sensor-1").unwrap();
        assert_eq!(state.telemetry.latest(&id).unwrap().value, 420.5);
    }

    #[tokio::test]
    async fn should_return_not_found_when_collecting_for_unknown_device() {
        let app = router::build(testing::state().await);

        let (status, body) = send(
            app,
            "POST",
            "/api/light-sensor/collect",
            Some(json!({"deviceId": "ghost", "lightValue": 1.0})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn should_reject_collect_body_with_unknown_fields() {
        let app = router::build(testing::state().await);

        let (status, body) = send(
            app,
            "POST",
            "/api/light-sensor/collect",
            Some(json!({"deviceId": "sensor-1", "lightValue": 1.0, "lux": 3})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("lux"));
    }

    #[tokio::test]
    async fn should_reject_collect_body_with_json_error_when_malformed() {
        let app = router::build(testing::state().await);
        let request = Request::builder()
            .method("POST")
            .uri("/api/light-sensor/collect")
            .header("content-type", "application/json")
            .body(Body::from("{\"deviceId\": "))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn should_return_readings_newest_first_up_to_limit() {
        let state = testing::state().await;
        for value in [1.0, 2.0, 3.0] {
            send(
                router::build(state.clone()),
                "POST",
                "/api/light-sensor/collect",
                Some(json!({"deviceId": "sensor-1", "lightValue": value})),
            )
            .await;
        }

        let (status, body) = send(
            router::build(state),
            "GET",
            "/api/light-sensor/sensor-1/data?limit=2",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let values: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["lightValue"].as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![3.0, 2.0]);
    }

    #[tokio::test]
    async fn should_reject_zero_limit() {
        let app = router::build(testing::state().await);

        let (status, _) = send(app, "GET", "/api/light-sensor/sensor-1/data?limit=0", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_return_not_found_when_no_latest_reading() {
        let app = router::build(testing::state().await);

        let (status, _) = send(app, "GET", "/api/light-sensor/sensor-1/latest", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_summarize_retained_readings() {
        let state = testing::state().await;
        for value in [100.0, 300.0] {
            send(
                router::build(state.clone()),
                "POST",
                "/api/light-sensor/collect",
                Some(json!({"deviceId": "sensor-1", "lightValue": value})),
            )
            .await;
        }

        let (status, body) = send(
            router::build(state),
            "GET",
            "/api/light-sensor/sensor-1/statistics",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["avgValue"], 200.0);
        assert_eq!(body["minValue"], 100.0);
        assert_eq!(body["maxValue"], 300.0);
        assert_eq!(body["latestValue"], 300.0);
    }

    #[tokio::test]
    async fn should_push_new_readings_to_stream_subscriber() {
        let state = testing::state().await;
        let sse = stream(
            State(state.clone()),
            Query(StreamQuery {
                device_id: Some("sensor-1".to_string()),
            }),
        )
        .await
        .unwrap();
        let mut body = sse.into_response().into_body();
        assert_eq!(state.telemetry.subscriber_count(), 1);

        let reading = Reading::new(
            DeviceId::new("sensor-1").unwrap(),
            640.0,
            lumen_domain::time::now(),
            ReadingSource::Hardware,
        )
        .unwrap();
        state.telemetry.append(reading).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.starts_with("event: reading\n"));
        assert!(text.contains("\"lightValue\":640.0"));
    }

    #[tokio::test]
    async fn should_reject_stream_filter_when_device_id_invalid() {
        let app = router::build(testing::state().await);

        let (status, _) = send(app, "GET", "/api/light-sensor/stream?deviceId=a%20b", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
