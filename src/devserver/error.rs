//! Dev Server Error Types
//!
//! Errors raised by the development backend and their HTTP responses. Bodies
//! use the backend's `{"error": "..."}` shape so clients surface the text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevServerError {
    /// Required form fields missing or unreadable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fields present but unacceptable
    #[error("{0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl IntoResponse for DevServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            DevServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DevServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DevServerError::Io(_) | DevServerError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        tracing::warn!(status = %status, error = %self, "Request failed");

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type DevResult<T> = Result<T, DevServerError>;
