use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::responses::{success, ApiError};
use super::router::AppState;

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub prefix: Option<String>,
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let prefix = params.prefix.filter(|p| !p.is_empty());
    let files = state.migrations.list_objects(prefix.as_deref()).await?;
    Ok(success(json!({
        "bucket": state.migrations.bucket(),
        "prefix": prefix,
        "count": files.len(),
        "files": files,
    })))
}

pub async fn stream_audio(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let key = validate_key(&key)?;
    let download = state.migrations.open_object(key).await?;
    debug!(key, length = ?download.content_length, "Streaming object");

    let content_type = download
        .content_type
        .unwrap_or_else(|| DEFAULT_AUDIO_TYPE.to_string());
    let mut response = (
        [(CONTENT_TYPE, content_type)],
        Body::from_stream(download.body),
    )
        .into_response();
    if let Some(length) = download.content_length {
        response.headers_mut().insert(CONTENT_LENGTH, length.into());
    }
    Ok(response)
}

/// Object keys are relative bucket paths: no leading slash, no `..` segments.
fn validate_key(key: &str) -> Result<&str, ApiError> {
    let key = key.trim();
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "..");
    if bad {
        return Err(ApiError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert_eq!(validate_key("listening_tarea1/abc.mp3").unwrap(), "listening_tarea1/abc.mp3");
        for bad in ["", "/abs.mp3", "a/../b.mp3", "a//b.mp3", "..", "a\\b.mp3"] {
            assert!(validate_key(bad).is_err(), "accepted {:?}", bad);
        }
    }
}
