use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use morph_api::ApiError;
use serde_json::json;
use tracing::error;

/// An [`ApiError`] rendered as `{"code", "message"}` with a matching status.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        HttpError(err)
    }
}

pub fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
        ApiError::InvariantViolation { .. } | ApiError::AlreadyExists { .. } => {
            StatusCode::CONFLICT
        }
        ApiError::NotFound { .. } | ApiError::UnknownEntity { .. } => StatusCode::NOT_FOUND,
        ApiError::ValidationError { .. } | ApiError::InvalidDescriptor { .. } => {
            StatusCode::BAD_REQUEST
        }
        ApiError::Storage { .. } | ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("[HttpError] {}", self.0);
        }
        let body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
