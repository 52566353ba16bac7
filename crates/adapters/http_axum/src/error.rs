//! HTTP error response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use lumen_domain::error::{LumenError, RejectedReason, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`LumenError`] and request body rejections to an HTTP response
/// with the appropriate status code and a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    Domain(LumenError),
    /// The request body was missing, not JSON, or did not match the
    /// expected shape. Keeps axum's status (400, 413, 415 or 422).
    Body(JsonRejection),
}

impl From<LumenError> for ApiError {
    fn from(err: LumenError) -> Self {
        Self::Domain(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let err = match self {
            Self::Domain(err) => err,
            Self::Body(rejection) => return rejection.status(),
        };
        match err {
            LumenError::Validation(_) => StatusCode::BAD_REQUEST,
            LumenError::NotFound(_) | LumenError::Rejected(RejectedReason::UnknownDevice { .. }) => {
                StatusCode::NOT_FOUND
            }
            LumenError::Rejected(RejectedReason::StaleTimestamp { .. }) => StatusCode::CONFLICT,
            LumenError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LumenError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Body(rejection) => {
                tracing::debug!(%status, "rejected request body");
                rejection.body_text()
            }
            Self::Domain(LumenError::Storage(err)) => {
                tracing::error!(error = %err, "storage error");
                "internal server error".to_string()
            }
            Self::Domain(err @ LumenError::Unavailable(component)) => {
                tracing::warn!(component, "request hit a stopped component");
                err.to_string()
            }
            Self::Domain(other) => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
