// JSON envelopes: `{"success": true, ...}` and `{"success": false, "error": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::documents::DocumentError;
use crate::core::migration::MigrationError;

#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// Wraps a report so its fields sit next to `"success": true`.
pub fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTable(_) => StatusCode::NOT_FOUND,
            ApiError::Migration(MigrationError::ObjectNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::InvalidKey(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
