use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;

use super::migration_service::MigrationError;

// ============================================================================
// TABLE REGISTRY
// ============================================================================

/// One content table that references audio by Drive URL.
///
/// SQL identifiers are only ever taken from this registry, never from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioTable {
    /// Short name used in URLs and on the command line.
    pub slug: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub audio_column: &'static str,
    pub bucket_column: &'static str,
    /// Folder inside the bucket the audio is uploaded to.
    pub storage_prefix: &'static str,
}

impl AudioTable {
    const fn new(
        slug: &'static str,
        table: &'static str,
        id_column: &'static str,
        storage_prefix: &'static str,
    ) -> Self {
        Self {
            slug,
            table,
            id_column,
            audio_column: "audio_url",
            bucket_column: "bucket_url",
            storage_prefix,
        }
    }

    pub fn find(slug: &str) -> Option<&'static AudioTable> {
        AUDIO_TABLES.iter().find(|t| t.slug == slug)
    }

    pub fn slugs() -> Vec<&'static str> {
        AUDIO_TABLES.iter().map(|t| t.slug).collect()
    }
}

pub static AUDIO_TABLES: &[AudioTable] = &[
    AudioTable::new("listening_tarea1", "listening_tarea1_set", "tarea1_set_id", "listening_tarea1"),
    AudioTable::new("listening_tarea2", "listening_tarea2_set", "tarea2_set_id", "listening_tarea2"),
    AudioTable::new("listening_tarea3", "listening_tarea3_set", "tarea3_set_id", "listening_tarea3"),
    AudioTable::new("listening_tarea4", "listening_tarea4_set", "tarea4_set_id", "listening_tarea4"),
    AudioTable::new("listening_tarea5", "listening_tarea5_set", "tarea5_set_id", "listening_tarea5"),
    AudioTable::new("writing_tarea1", "writing_tarea1_set", "tarea1_set_id", "writing_tarea1"),
    AudioTable::new("oral_tarea2", "oral_tarea2_solution", "solution_id", "oral_tarea2"),
];

// ============================================================================
// ROWS AND STATISTICS
// ============================================================================

/// A row whose audio still lives on Drive.
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub row_id: i64,
    pub audio_url: String,
    pub bucket_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub total_rows: i64,
    pub rows_with_audio_url: i64,
    pub rows_with_bucket_url: i64,
    pub pending_migration: i64,
}

/// Stats for one registry entry, or the reason they couldn't be read.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub table: AudioTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MigrationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single row that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row_id: i64,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl RowError {
    pub fn for_url(row: &PendingRow, error: &MigrationError) -> Self {
        Self {
            row_id: row.row_id,
            error: error.to_string(),
            url: Some(row.audio_url.clone()),
            file_id: None,
        }
    }

    pub fn for_file(row: &PendingRow, file_id: &str, error: &MigrationError) -> Self {
        Self {
            row_id: row.row_id,
            error: error.to_string(),
            url: None,
            file_id: Some(file_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigratedRow {
    pub row_id: i64,
    pub file_id: String,
    pub bucket_url: String,
    pub bytes: usize,
}

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of one migration batch.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub table: &'static str,
    pub test_mode: bool,
    pub total_rows: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub migrated: Vec<MigratedRow>,
    pub errors: Vec<RowError>,
    pub stats_before: MigrationStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_after: Option<MigrationStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    pub fn new(table: &AudioTable, test_mode: bool, stats_before: MigrationStats) -> Self {
        let now = Utc::now();
        Self {
            table: table.slug,
            test_mode,
            total_rows: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            migrated: Vec::new(),
            errors: Vec::new(),
            stats_before,
            stats_after: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record_success(&mut self, row: MigratedRow) {
        self.successful += 1;
        self.migrated.push(row);
    }

    pub fn record_failure(&mut self, error: RowError) {
        self.failed += 1;
        self.errors.push(error);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Outcome of running batches back to back until one migrates nothing.
#[derive(Debug, Clone, Serialize)]
pub struct AutoMigrationReport {
    pub table: &'static str,
    pub batch_size: i64,
    pub batches: Vec<BatchSummary>,
    pub total_processed: usize,
    pub total_successful: usize,
    pub total_failed: usize,
    pub errors: Vec<RowError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_stats: Option<MigrationStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AutoMigrationReport {
    pub fn new(table: &AudioTable, batch_size: i64) -> Self {
        let now = Utc::now();
        Self {
            table: table.slug,
            batch_size,
            batches: Vec::new(),
            total_processed: 0,
            total_successful: 0,
            total_failed: 0,
            errors: Vec::new(),
            final_stats: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn absorb(&mut self, batch: MigrationReport) {
        self.batches.push(BatchSummary {
            batch: self.batches.len() + 1,
            processed: batch.total_rows,
            successful: batch.successful,
            failed: batch.failed,
        });
        self.total_processed += batch.total_rows;
        self.total_successful += batch.successful;
        self.total_failed += batch.failed;
        self.final_stats = Some(batch.stats_after.unwrap_or(batch.stats_before));
        self.errors.extend(batch.errors);
        self.finished_at = batch.finished_at;
    }
}

// ============================================================================
// SCHEMA CHECK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredColumn {
    pub name: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRow {
    pub row_id: i64,
    pub audio_url_preview: Option<String>,
    pub bucket_url_preview: Option<String>,
}

/// What `check-db` reports about one table.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub table: &'static str,
    pub table_exists: bool,
    pub columns: Vec<ColumnInfo>,
    pub required_columns: Vec<RequiredColumn>,
    pub bucket_column_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MigrationStats>,
    pub samples: Vec<SampleRow>,
}

impl SchemaReport {
    pub fn missing_table(table: &AudioTable) -> Self {
        Self {
            table: table.table,
            table_exists: false,
            columns: Vec::new(),
            required_columns: Vec::new(),
            bucket_column_exists: false,
            stats: None,
            samples: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.table_exists && self.required_columns.iter().all(|c| c.present)
    }
}

// ============================================================================
// OBJECT STORAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// A bucket object being read back, body streamed as it arrives.
pub struct ObjectDownload {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, MigrationError>>,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
