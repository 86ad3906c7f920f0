// PostgreSQL implementation of the TareaStore trait.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::core::documents::{DocumentError, ParsedOralTarea, ParsedWritingTarea, TareaStore};

pub struct PgTareaStore {
    pool: PgPool,
}

impl PgTareaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_error(e: sqlx::Error) -> DocumentError {
    DocumentError::StorageError(e.to_string())
}

const DROP_WRITING_TABLES: &str = r#"
    DROP TABLE IF EXISTS writing_tarea1_solution;
    DROP TABLE IF EXISTS writing_tarea1_set;
"#;

const CREATE_WRITING_SET: &str = r#"
    CREATE TABLE writing_tarea1_set (
        tarea1_set_id SERIAL PRIMARY KEY,
        title TEXT,
        situation TEXT,
        task_instructions TEXT,
        word_limit TEXT,
        text_type TEXT,
        register TEXT,
        reminders TEXT,
        audio_url TEXT,
        bucket_url TEXT,
        module_type_id INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_WRITING_SOLUTION: &str = r#"
    CREATE TABLE writing_tarea1_solution (
        solution_id SERIAL PRIMARY KEY,
        tarea1_set_id INTEGER NOT NULL
            REFERENCES writing_tarea1_set (tarea1_set_id) ON DELETE CASCADE,
        solution_text TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

#[async_trait]
impl TareaStore for PgTareaStore {
    async fn insert_writing_tarea1(
        &self,
        tarea: &ParsedWritingTarea,
        module_type_id: i32,
    ) -> Result<i64, DocumentError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let set_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO writing_tarea1_set
                (title, situation, task_instructions, word_limit, text_type,
                 register, reminders, audio_url, module_type_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING tarea1_set_id::BIGINT
            "#,
        )
        .bind(&tarea.title)
        .bind(&tarea.situation)
        .bind(&tarea.task_instructions)
        .bind(&tarea.word_limit)
        .bind(&tarea.text_type)
        .bind(&tarea.register)
        .bind(&tarea.reminders)
        .bind(&tarea.audio_url)
        .bind(module_type_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        if let Some(solution) = tarea.solution_text.as_deref() {
            sqlx::query(
                r#"
                INSERT INTO writing_tarea1_solution (tarea1_set_id, solution_text)
                VALUES ($1::BIGINT, $2)
                "#,
            )
            .bind(set_id)
            .bind(solution)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(set_id)
    }

    async fn insert_oral_tarea2(
        &self,
        tarea: &ParsedOralTarea,
        module_type_id: i32,
        instructions: &str,
    ) -> Result<i64, DocumentError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let set_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO oral_tarea2_set (module_type_id, instructions, image_url)
            VALUES ($1, $2, $3)
            RETURNING tarea2_set_id::BIGINT
            "#,
        )
        .bind(module_type_id)
        .bind(instructions)
        .bind(&tarea.image_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO oral_tarea2_solution (tarea2_set_id, solution_text, audio_url, bucket_url)
            VALUES ($1::BIGINT, $2, $3, NULL)
            "#,
        )
        .bind(set_id)
        .bind(&tarea.solution_text)
        .bind(&tarea.audio_url)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(set_id)
    }

    async fn recreate_writing_tables(&self) -> Result<(), DocumentError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Multi-statement strings need the simple query protocol.
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(DROP_WRITING_TABLES))
            .await
            .map_err(storage_error)?;
        for statement in [CREATE_WRITING_SET, CREATE_WRITING_SOLUTION] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        info!("Recreated writing_tarea1_set and writing_tarea1_solution");
        Ok(())
    }
}
