use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::responses::{success, ApiError};
use super::router::AppState;

/// Every field is optional; an empty body uses the configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ParseRequest {
    pub folder: Option<String>,
    pub module_type_id: Option<i32>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
}

/// An empty body means defaults. Anything else must be a valid JSON request.
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<ParseRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ParseRequest::default());
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(ApiError::BadRequest(
            "Expected request with `Content-Type: application/json`".to_string(),
        ));
    }

    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

pub async fn parse_writing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_request(&headers, &body)?;
    let folder = request
        .folder
        .map(PathBuf::from)
        .unwrap_or_else(|| state.settings.writing_folder.clone());
    let module_type_id = request
        .module_type_id
        .unwrap_or(state.settings.writing_module_type_id);

    let report = state
        .documents
        .ingest_writing(&folder, module_type_id, request.limit, request.dry_run)
        .await?;
    Ok(success(report))
}

pub async fn parse_oral(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_request(&headers, &body)?;
    let folder = request
        .folder
        .map(PathBuf::from)
        .unwrap_or_else(|| state.settings.oral_folder.clone());
    let module_type_id = request
        .module_type_id
        .unwrap_or(state.settings.oral_module_type_id);

    let report = state
        .documents
        .ingest_oral(&folder, module_type_id, request.limit, request.dry_run)
        .await?;
    Ok(success(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        let request = parse_request(&HeaderMap::new(), b"").unwrap();
        assert!(request.folder.is_none());
        assert!(!request.dry_run);

        let request = parse_request(&HeaderMap::new(), b" \n").unwrap();
        assert!(request.limit.is_none());
    }

    #[test]
    fn test_json_body_is_parsed() {
        let request = parse_request(
            &json_headers("application/json; charset=utf-8"),
            br#"{"folder": "docs", "limit": 2, "dry_run": true}"#,
        )
        .unwrap();
        assert_eq!(request.folder.as_deref(), Some("docs"));
        assert_eq!(request.limit, Some(2));
        assert!(request.dry_run);
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        let form = json_headers("application/x-www-form-urlencoded");
        assert!(matches!(
            parse_request(&form, br#"{"dry_run": true}"#),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_request(&HeaderMap::new(), br#"{"dry_run": true}"#),
            Err(ApiError::BadRequest(_))
        ));

        let json = json_headers("application/json");
        assert!(matches!(
            parse_request(&json, br#"{"dry_run": "true"}"#),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_request(&json, b"{not json"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
