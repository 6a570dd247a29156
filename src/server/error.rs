//! API error handling

use crate::core::TriggerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// API error type, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::UnknownProvider(_) => ApiError::NotFound(err.to_string()),
            TriggerError::InvalidJson(_) | TriggerError::UndetectedProvider => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
