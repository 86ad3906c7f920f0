use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::responses::{success, ApiError};
use super::router::AppState;
use crate::core::migration::{AudioTable, AUDIO_TABLES};

#[derive(Debug, Deserialize)]
pub struct MigrateParams {
    pub limit: Option<i64>,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Deserialize)]
pub struct AutoMigrateParams {
    pub batch_size: Option<i64>,
}

/// Only registry slugs get through; nothing else reaches SQL.
fn resolve(slug: &str) -> Result<&'static AudioTable, ApiError> {
    AudioTable::find(slug).ok_or_else(|| ApiError::UnknownTable(slug.to_string()))
}

pub async fn list_tables(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    success(json!({
        "bucket": state.migrations.bucket(),
        "tables": AUDIO_TABLES,
    }))
}

pub async fn table_status(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve(&slug)?;
    let stats = state.migrations.stats(table).await?;
    Ok(success(json!({
        "table": table.slug,
        "stats": stats,
    })))
}

pub async fn check_table(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve(&slug)?;
    let report = state.migrations.check_table(table).await?;
    let ready = report.is_ready();
    Ok(success(json!({
        "ready": ready,
        "report": report,
    })))
}

pub async fn migrate(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<MigrateParams>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve(&slug)?;
    if params.limit.map_or(false, |limit| limit < 0) {
        return Err(ApiError::BadRequest("limit must not be negative".to_string()));
    }
    let report = state
        .migrations
        .migrate_batch(table, params.limit, params.test_mode)
        .await?;
    Ok(success(report))
}

pub async fn auto_migrate(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<AutoMigrateParams>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve(&slug)?;
    let batch_size = params
        .batch_size
        .unwrap_or(state.settings.auto_migrate_batch_size);
    if batch_size < 1 {
        return Err(ApiError::BadRequest("batch_size must be at least 1".to_string()));
    }
    let report = state.migrations.auto_migrate(table, batch_size).await?;
    Ok(success(report))
}
