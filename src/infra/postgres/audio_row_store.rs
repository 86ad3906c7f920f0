// PostgreSQL implementation of the AudioRowStore trait.
//
// Table and column names are spliced into the SQL, so they only ever come
// from the static `AudioTable` registry.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::core::migration::{
    AudioRowStore, AudioTable, ColumnInfo, MigrationError, MigrationStats, PendingRow,
    RequiredColumn, SampleRow, SchemaReport,
};

/// SQL twin of `is_migrated`: `gs://` followed by a bucket, a slash and a key.
const MIGRATED_PATTERN: &str = "gs://_%/_%";
const SAMPLE_ROWS: i64 = 3;
const PREVIEW_CHARS: i32 = 60;

pub struct PgAudioRowStore {
    pool: PgPool,
}

impl PgAudioRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn table_exists(&self, table: &AudioTable) -> Result<bool, MigrationError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table.table)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn columns(&self, table: &AudioTable) -> Result<Vec<ColumnInfo>, MigrationError> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::TEXT AS name,
                   data_type::TEXT AS data_type,
                   is_nullable::TEXT AS nullable
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table.table)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get("name"),
                data_type: row.get("data_type"),
                nullable: row.get::<String, _>("nullable") == "YES",
            })
            .collect())
    }

    async fn samples(&self, table: &AudioTable) -> Result<Vec<SampleRow>, MigrationError> {
        let rows = sqlx::query(&sample_sql(table))
            .bind(PREVIEW_CHARS)
            .bind(SAMPLE_ROWS)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows
            .iter()
            .map(|row| SampleRow {
                row_id: row.get("row_id"),
                audio_url_preview: row.get("audio_preview"),
                bucket_url_preview: row.get("bucket_preview"),
            })
            .collect())
    }
}

fn storage_error(e: sqlx::Error) -> MigrationError {
    MigrationError::StorageError(e.to_string())
}

fn has_audio(table: &AudioTable) -> String {
    format!("{0} IS NOT NULL AND {0} <> ''", table.audio_column)
}

fn not_migrated(table: &AudioTable) -> String {
    format!(
        "({0} IS NULL OR TRIM({0}) NOT LIKE '{1}')",
        table.bucket_column, MIGRATED_PATTERN
    )
}

fn stats_sql(table: &AudioTable) -> String {
    format!(
        r#"
        SELECT COUNT(*)::BIGINT AS total_rows,
               COUNT(*) FILTER (WHERE {has_audio})::BIGINT AS rows_with_audio_url,
               COUNT(*) FILTER (WHERE TRIM({bucket}) LIKE '{pattern}')::BIGINT AS rows_with_bucket_url,
               COUNT(*) FILTER (WHERE {has_audio} AND {pending})::BIGINT AS pending_migration
        FROM {table}
        "#,
        has_audio = has_audio(table),
        bucket = table.bucket_column,
        pattern = MIGRATED_PATTERN,
        pending = not_migrated(table),
        table = table.table,
    )
}

/// `LIMIT NULL` means no limit, so the bound limit may be absent.
fn pending_sql(table: &AudioTable) -> String {
    format!(
        r#"
        SELECT {id}::BIGINT AS row_id, {audio} AS audio_url, {bucket} AS bucket_url
        FROM {table}
        WHERE {has_audio} AND {pending}
        ORDER BY {id}
        LIMIT $1
        "#,
        id = table.id_column,
        audio = table.audio_column,
        bucket = table.bucket_column,
        table = table.table,
        has_audio = has_audio(table),
        pending = not_migrated(table),
    )
}

fn sample_sql(table: &AudioTable) -> String {
    format!(
        r#"
        SELECT {id}::BIGINT AS row_id,
               LEFT({audio}, $1) AS audio_preview,
               LEFT({bucket}, $1) AS bucket_preview
        FROM {table}
        WHERE {has_audio}
        ORDER BY {id}
        LIMIT $2
        "#,
        id = table.id_column,
        audio = table.audio_column,
        bucket = table.bucket_column,
        table = table.table,
        has_audio = has_audio(table),
    )
}

#[async_trait]
impl AudioRowStore for PgAudioRowStore {
    async fn ensure_bucket_column(&self, table: &AudioTable) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} TEXT",
            table.table, table.bucket_column
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn stats(&self, table: &AudioTable) -> Result<MigrationStats, MigrationError> {
        let row = sqlx::query(&stats_sql(table))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(MigrationStats {
            total_rows: row.get("total_rows"),
            rows_with_audio_url: row.get("rows_with_audio_url"),
            rows_with_bucket_url: row.get("rows_with_bucket_url"),
            pending_migration: row.get("pending_migration"),
        })
    }

    async fn pending_rows(
        &self,
        table: &AudioTable,
        limit: Option<i64>,
    ) -> Result<Vec<PendingRow>, MigrationError> {
        let rows = sqlx::query(&pending_sql(table))
            .bind(limit.map(|limit| limit.max(0)))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows
            .iter()
            .map(|row| PendingRow {
                row_id: row.get("row_id"),
                audio_url: row.get("audio_url"),
                bucket_url: row.get("bucket_url"),
            })
            .collect())
    }

    async fn set_bucket_url(
        &self,
        table: &AudioTable,
        row_id: i64,
        bucket_url: &str,
    ) -> Result<(), MigrationError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET {} = $1 WHERE {} = $2",
            table.table, table.bucket_column, table.id_column
        ))
        .bind(bucket_url)
        .bind(row_id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(MigrationError::StorageError(format!(
                "{} row {} no longer exists",
                table.table, row_id
            )));
        }
        Ok(())
    }

    async fn inspect(&self, table: &AudioTable) -> Result<SchemaReport, MigrationError> {
        if !self.table_exists(table).await? {
            return Ok(SchemaReport::missing_table(table));
        }

        let columns = self.columns(table).await?;
        let has_column = |name: &str| columns.iter().any(|c| c.name == name);

        let required_columns: Vec<RequiredColumn> = [table.id_column, table.audio_column]
            .iter()
            .map(|name| RequiredColumn {
                name: name.to_string(),
                present: has_column(name),
            })
            .collect();
        let bucket_column_exists = has_column(table.bucket_column);
        let ready = required_columns.iter().all(|c| c.present) && bucket_column_exists;

        let (stats, samples) = if ready {
            (Some(self.stats(table).await?), self.samples(table).await?)
        } else {
            (None, Vec::new())
        };

        Ok(SchemaReport {
            table: table.table,
            table_exists: true,
            columns,
            required_columns,
            bucket_column_exists,
            stats,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> &'static AudioTable {
        AudioTable::find("oral_tarea2").unwrap()
    }

    #[test]
    fn test_pending_query_orders_by_id_and_skips_migrated() {
        let sql = pending_sql(table());
        assert!(sql.contains("FROM oral_tarea2_solution"));
        assert!(sql.contains("ORDER BY solution_id"));
        assert!(sql.contains("bucket_url IS NULL OR TRIM(bucket_url) NOT LIKE 'gs://_%/_%'"));
        assert!(sql.contains("audio_url IS NOT NULL AND audio_url <> ''"));
    }

    #[test]
    fn test_stats_query_counts_every_bucket() {
        let sql = stats_sql(AudioTable::find("listening_tarea3").unwrap());
        assert!(sql.contains("FROM listening_tarea3_set"));
        for column in ["total_rows", "rows_with_audio_url", "rows_with_bucket_url", "pending_migration"] {
            assert!(sql.contains(column), "missing {}", column);
        }
    }

    #[test]
    fn test_sample_query_truncates_previews() {
        let sql = sample_sql(table());
        assert!(sql.contains("LEFT(audio_url, $1)"));
        assert!(sql.contains("LIMIT $2"));
    }
}
