//! Mapping hub failures to HTTP responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use crate::hub::HubError;
use crate::storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Handler failure, rendered as `{"error": "..."}` with a matching status code
#[derive(Debug)]
pub enum ApiError {
    /// The maintenance store or status cache failed
    Storage(String),

    /// The request body or parameters make no sense, e.g. a reversed window
    InvalidRequest(String),

    /// Unknown environment, tenant or maintenance record
    NotFound(String),

    /// The time-series backend rejected or failed a request
    Upstream(String),

    /// The hub's own configuration is broken
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::Storage(msg)
            | ApiError::InvalidRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Upstream(msg)
            | ApiError::Internal(msg) => msg,
        };

        if status.is_server_error() {
            warn!(%status, "request failed: {message}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(format!("maintenance {id} not found")),
            err => ApiError::Storage(err.to_string()),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::NotFound(_) => ApiError::NotFound(err.to_string()),
            HubError::Configuration(_) => ApiError::Internal(err.to_string()),
            HubError::TimeSeries(_) => ApiError::Upstream(err.to_string()),
            HubError::Storage(err) => err.into(),
        }
    }
}
