// Audio migration: Drive share link -> bucket object -> URI written back to the row.
//
// The service only talks to the three ports below. Postgres, Drive and Cloud
// Storage live in infra/, and the tests swap them for in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::drive_url::{content_type_for, extract_google_drive_id, is_migrated, object_key};
use super::migration_models::{
    AudioTable, AutoMigrationReport, MigratedRow, MigrationReport, MigrationStats, ObjectDownload,
    PendingRow, RowError, SchemaReport, StoredObject, TableStatus, AUDIO_TABLES,
};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Could not extract Google Drive file ID")]
    MissingFileId,

    #[error("Failed to download from Google Drive: {0}")]
    Download(String),

    #[error("Downloaded file is empty")]
    EmptyDownload,

    #[error("Failed to upload to GCS: {0}")]
    Upload(String),

    #[error("Failed to read from GCS: {0}")]
    ObjectRead(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),
}

// ============================================================================
// PORTS
// ============================================================================

/// Rows that point at audio, and where their migrated URI gets written.
#[async_trait]
pub trait AudioRowStore: Send + Sync {
    /// Adds the storage column when the table predates the migration.
    async fn ensure_bucket_column(&self, table: &AudioTable) -> Result<(), MigrationError>;

    async fn stats(&self, table: &AudioTable) -> Result<MigrationStats, MigrationError>;

    /// Rows with a source URL and no valid storage URI, ordered by id.
    async fn pending_rows(
        &self,
        table: &AudioTable,
        limit: Option<i64>,
    ) -> Result<Vec<PendingRow>, MigrationError>;

    async fn set_bucket_url(
        &self,
        table: &AudioTable,
        row_id: i64,
        bucket_url: &str,
    ) -> Result<(), MigrationError>;

    async fn inspect(&self, table: &AudioTable) -> Result<SchemaReport, MigrationError>;
}

/// Where the original audio bytes come from.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download(&self, file_id: &str) -> Result<Bytes, MigrationError>;
}

/// The bucket the audio is moved into.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Uploads `data` under `key` and returns the object URI.
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, MigrationError>;

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>, MigrationError>;

    async fn open(&self, key: &str) -> Result<ObjectDownload, MigrationError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct MigrationService {
    rows: Box<dyn AudioRowStore>,
    source: Box<dyn AudioSource>,
    objects: Arc<dyn ObjectStore>,
}

impl MigrationService {
    pub fn new(
        rows: Box<dyn AudioRowStore>,
        source: Box<dyn AudioSource>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            rows,
            source,
            objects,
        }
    }

    /// Read-only. A table without the storage column reports a store error.
    pub async fn stats(&self, table: &AudioTable) -> Result<MigrationStats, MigrationError> {
        self.rows.stats(table).await
    }

    /// Stats for every registered table. A table that fails is reported, not fatal.
    pub async fn stats_for_all(&self) -> Vec<TableStatus> {
        let mut statuses = Vec::with_capacity(AUDIO_TABLES.len());
        for table in AUDIO_TABLES {
            let status = match self.stats(table).await {
                Ok(stats) => TableStatus {
                    table: *table,
                    stats: Some(stats),
                    error: None,
                },
                Err(e) => {
                    warn!(table = table.slug, error = %e, "Failed to read migration stats");
                    TableStatus {
                        table: *table,
                        stats: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            statuses.push(status);
        }
        statuses
    }

    pub async fn check_table(&self, table: &AudioTable) -> Result<SchemaReport, MigrationError> {
        self.rows.inspect(table).await
    }

    /// Migrates up to `limit` pending rows of `table`, one after the other.
    ///
    /// A failing row is recorded in the report and the batch moves on.
    /// In test mode the audio is still copied but the row is left untouched.
    pub async fn migrate_batch(
        &self,
        table: &AudioTable,
        limit: Option<i64>,
        test_mode: bool,
    ) -> Result<MigrationReport, MigrationError> {
        self.rows.ensure_bucket_column(table).await?;
        let stats_before = self.rows.stats(table).await?;
        let rows = self.rows.pending_rows(table, limit).await?;

        info!(
            table = table.slug,
            pending = rows.len(),
            test_mode,
            "Starting migration batch"
        );

        let mut report = MigrationReport::new(table, test_mode, stats_before);

        for (idx, row) in rows.iter().enumerate() {
            if is_migrated(row.bucket_url.as_deref()) {
                report.skipped += 1;
                continue;
            }

            info!(
                table = table.slug,
                row_id = row.row_id,
                "[{}/{}] Migrating row",
                idx + 1,
                rows.len()
            );

            match self.migrate_row(table, row, test_mode).await {
                Ok(migrated) => {
                    info!(row_id = row.row_id, bucket_url = %migrated.bucket_url, "Row migrated");
                    report.record_success(migrated);
                }
                Err(err) => {
                    warn!(row_id = row.row_id, error = %err.error, "Row migration failed");
                    report.record_failure(err);
                }
            }
        }

        report.total_rows = rows.len() - report.skipped;

        if !test_mode && report.successful > 0 {
            report.stats_after = Some(self.rows.stats(table).await?);
        }
        report.finished_at = chrono::Utc::now();

        info!(
            table = table.slug,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            "Migration batch finished"
        );

        Ok(report)
    }

    /// Runs batches until one of them migrates nothing.
    pub async fn auto_migrate(
        &self,
        table: &AudioTable,
        batch_size: i64,
    ) -> Result<AutoMigrationReport, MigrationError> {
        let batch_size = batch_size.max(1);
        let mut report = AutoMigrationReport::new(table, batch_size);

        loop {
            let batch = self.migrate_batch(table, Some(batch_size), false).await?;
            let successful = batch.successful;
            report.absorb(batch);

            if successful == 0 {
                break;
            }
        }

        info!(
            table = table.slug,
            batches = report.batches.len(),
            successful = report.total_successful,
            failed = report.total_failed,
            "Auto-migration finished"
        );

        Ok(report)
    }

    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredObject>, MigrationError> {
        self.objects.list(prefix).await
    }

    pub async fn open_object(&self, key: &str) -> Result<ObjectDownload, MigrationError> {
        self.objects.open(key).await
    }

    pub fn bucket(&self) -> &str {
        self.objects.bucket()
    }

    async fn migrate_row(
        &self,
        table: &AudioTable,
        row: &PendingRow,
        test_mode: bool,
    ) -> Result<MigratedRow, RowError> {
        let file_id = extract_google_drive_id(&row.audio_url)
            .ok_or_else(|| RowError::for_url(row, &MigrationError::MissingFileId))?;

        let data = self
            .source
            .download(&file_id)
            .await
            .map_err(|e| RowError::for_file(row, &file_id, &e))?;
        if data.is_empty() {
            return Err(RowError::for_file(row, &file_id, &MigrationError::EmptyDownload));
        }
        let size = data.len();

        let key = object_key(table.storage_prefix, &file_id);
        let bucket_url = self
            .objects
            .upload(&key, data, content_type_for(&key))
            .await
            .map_err(|e| RowError::for_file(row, &file_id, &e))?;

        if !test_mode {
            self.rows
                .set_bucket_url(table, row.row_id, &bucket_url)
                .await
                .map_err(|e| RowError::for_url(row, &e))?;
        }

        Ok(MigratedRow {
            row_id: row.row_id,
            file_id,
            bucket_url,
            bytes: size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{FakeAudioSource, FakeObjectStore, InMemoryAudioRows};

    fn table() -> &'static AudioTable {
        AudioTable::find("listening_tarea1").unwrap()
    }

    fn drive(id: &str) -> String {
        format!("https://drive.google.com/file/d/{}/view?usp=drivesdk", id)
    }

    fn service(
        rows: &InMemoryAudioRows,
        source: &FakeAudioSource,
        objects: &FakeObjectStore,
    ) -> MigrationService {
        MigrationService::new(
            Box::new(rows.clone()),
            Box::new(source.clone()),
            Arc::new(objects.clone()),
        )
    }

    #[tokio::test]
    async fn test_migrates_pending_rows_and_writes_back_uri() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some(&drive("fileA")), None);
        rows.insert(2, Some(&drive("fileB")), None);
        let source = FakeAudioSource::new().with_file("fileA", b"aaa").with_file("fileB", b"bb");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), None, false)
            .await
            .unwrap();

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(
            rows.bucket_url(1).as_deref(),
            Some("gs://content/listening_tarea1/fileA.mp3")
        );
        assert_eq!(objects.object("listening_tarea1/fileB.mp3").as_deref(), Some(&b"bb"[..]));
        assert_eq!(report.stats_after.map(|s| s.pending_migration), Some(0));
    }

    #[tokio::test]
    async fn test_migrated_rows_are_never_reprocessed() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some(&drive("fileA")), Some("gs://content/listening_tarea1/fileA.mp3"));
        rows.insert(2, Some(&drive("fileB")), None);
        let source = FakeAudioSource::new().with_file("fileA", b"a").with_file("fileB", b"b");
        let objects = FakeObjectStore::new("content");
        let service = service(&rows, &source, &objects);

        let first = service.migrate_batch(table(), None, false).await.unwrap();
        assert_eq!(first.successful, 1);
        assert_eq!(source.downloads(), vec!["fileB".to_string()]);

        let second = service.migrate_batch(table(), None, false).await.unwrap();
        assert_eq!(second.total_rows, 0);
        assert_eq!(second.successful, 0);
        assert_eq!(source.downloads().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_migrated_since_the_query_are_skipped_not_processed() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some(&drive("fileA")), Some("gs://content/listening_tarea1/fileA.mp3"));
        rows.insert(2, Some(&drive("fileB")), None);
        rows.serve_stale_pending();
        let source = FakeAudioSource::new().with_file("fileA", b"a").with_file("fileB", b"b");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), None, false)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.total_rows, 1);
        assert_eq!(report.successful, 1);
        assert_eq!(source.downloads(), vec!["fileB".to_string()]);
    }

    #[tokio::test]
    async fn test_stats_never_alter_the_table() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some(&drive("fileA")), None);
        let source = FakeAudioSource::new().with_file("fileA", b"a");
        let objects = FakeObjectStore::new("content");
        let service = service(&rows, &source, &objects);

        service.stats(table()).await.unwrap();
        let statuses = service.stats_for_all().await;
        assert!(statuses.iter().all(|s| s.stats.is_some()));
        assert_eq!(rows.ensure_column_calls(), 0);

        service.migrate_batch(table(), None, true).await.unwrap();
        assert_eq!(rows.ensure_column_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_bucket_url_is_still_pending() {
        let rows = InMemoryAudioRows::new();
        rows.insert(7, Some(&drive("fileC")), Some(""));
        let source = FakeAudioSource::new().with_file("fileC", b"c");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), None, false)
            .await
            .unwrap();

        assert_eq!(report.successful, 1);
        assert!(is_migrated(rows.bucket_url(7).as_deref()));
    }

    #[tokio::test]
    async fn test_row_failures_do_not_abort_the_batch() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some("https://example.com/not-drive.mp3"), None);
        rows.insert(2, Some(&drive("missing")), None);
        rows.insert(3, Some(&drive("empty")), None);
        rows.insert(4, Some(&drive("good")), None);
        let source = FakeAudioSource::new().with_file("empty", b"").with_file("good", b"ok");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), None, false)
            .await
            .unwrap();

        assert_eq!(report.total_rows, 4);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 3);

        let first = &report.errors[0];
        assert_eq!(first.row_id, 1);
        assert_eq!(first.error, "Could not extract Google Drive file ID");
        assert_eq!(first.url.as_deref(), Some("https://example.com/not-drive.mp3"));

        assert_eq!(report.errors[1].file_id.as_deref(), Some("missing"));
        assert_eq!(report.errors[2].error, "Downloaded file is empty");
        assert!(rows.bucket_url(4).is_some());
    }

    #[tokio::test]
    async fn test_test_mode_uploads_without_writing_back() {
        let rows = InMemoryAudioRows::new();
        rows.insert(1, Some(&drive("fileA")), None);
        let source = FakeAudioSource::new().with_file("fileA", b"a");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), Some(10), true)
            .await
            .unwrap();

        assert!(report.test_mode);
        assert_eq!(report.successful, 1);
        assert!(report.stats_after.is_none());
        assert_eq!(rows.bucket_url(1), None);
        assert!(objects.object("listening_tarea1/fileA.mp3").is_some());
    }

    #[tokio::test]
    async fn test_limit_is_respected_in_id_order() {
        let rows = InMemoryAudioRows::new();
        rows.insert(3, Some(&drive("c")), None);
        rows.insert(1, Some(&drive("a")), None);
        rows.insert(2, Some(&drive("b")), None);
        let source = FakeAudioSource::new()
            .with_file("a", b"1")
            .with_file("b", b"2")
            .with_file("c", b"3");
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .migrate_batch(table(), Some(2), false)
            .await
            .unwrap();

        let ids: Vec<i64> = report.migrated.iter().map(|m| m.row_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(rows.bucket_url(3), None);
    }

    #[tokio::test]
    async fn test_auto_migrate_stops_when_a_batch_has_no_success() {
        let rows = InMemoryAudioRows::new();
        for id in 1..=5 {
            rows.insert(id, Some(&drive(&format!("f{}", id))), None);
        }
        rows.insert(6, Some(&drive("broken")), None);
        let mut source = FakeAudioSource::new();
        for id in 1..=5 {
            source = source.with_file(&format!("f{}", id), b"x");
        }
        let objects = FakeObjectStore::new("content");

        let report = service(&rows, &source, &objects)
            .auto_migrate(table(), 2)
            .await
            .unwrap();

        assert_eq!(report.total_successful, 5);
        // The broken row is retried once per batch it lands in.
        assert!(report.total_failed >= 1);
        assert_eq!(report.batches.last().map(|b| b.successful), Some(0));
        assert_eq!(report.final_stats.map(|s| s.pending_migration), Some(1));
    }

    #[tokio::test]
    async fn test_store_failure_is_a_call_level_error() {
        let rows = InMemoryAudioRows::new();
        rows.fail_with("connection refused");
        let source = FakeAudioSource::new();
        let objects = FakeObjectStore::new("content");

        let err = service(&rows, &source, &objects)
            .migrate_batch(table(), None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));

        let statuses = service(&rows, &source, &objects).stats_for_all().await;
        assert_eq!(statuses.len(), AUDIO_TABLES.len());
        assert!(statuses.iter().all(|s| s.error.is_some()));
    }
}
