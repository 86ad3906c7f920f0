pub mod drive_url;
pub mod migration_models;
pub mod migration_service;

pub use drive_url::{content_type_for, extract_google_drive_id, gcs_uri, is_migrated, object_key};
pub use migration_models::{
    AudioTable, AutoMigrationReport, BatchSummary, ColumnInfo, MigratedRow, MigrationReport,
    MigrationStats, ObjectDownload, PendingRow, RequiredColumn, RowError, SampleRow, SchemaReport,
    StoredObject, TableStatus, AUDIO_TABLES,
};
pub use migration_service::{AudioRowStore, AudioSource, MigrationError, MigrationService, ObjectStore};
