// Folder of .docx files -> parsed tareas -> database rows.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::document_models::{
    DocumentError, DocumentKind, IngestReport, IngestedDocument, ParsedOralTarea,
    ParsedWritingTarea, SegmentationMode,
};
use super::oral_parser::{parse_oral_tarea2_lines, DEFAULT_ORAL_INSTRUCTIONS};
use super::writing_parser::parse_writing_tarea1_lines;

// ============================================================================
// PORTS
// ============================================================================

/// Turns a document on disk into its ordered, non-empty text lines.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, DocumentError>;
}

/// Persists parsed tareas. Each insert writes the set row and its solution
/// row atomically and returns the new set id.
#[async_trait]
pub trait TareaStore: Send + Sync {
    async fn insert_writing_tarea1(
        &self,
        tarea: &ParsedWritingTarea,
        module_type_id: i32,
    ) -> Result<i64, DocumentError>;

    async fn insert_oral_tarea2(
        &self,
        tarea: &ParsedOralTarea,
        module_type_id: i32,
        instructions: &str,
    ) -> Result<i64, DocumentError>;

    /// Drops and recreates the writing tarea 1 tables.
    async fn recreate_writing_tables(&self) -> Result<(), DocumentError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct IngestService {
    reader: Box<dyn DocumentReader>,
    store: Box<dyn TareaStore>,
}

impl IngestService {
    pub fn new(reader: Box<dyn DocumentReader>, store: Box<dyn TareaStore>) -> Self {
        Self { reader, store }
    }

    pub async fn ingest_writing(
        &self,
        folder: &Path,
        module_type_id: i32,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<IngestReport, DocumentError> {
        let files = list_docx_files(folder, limit)?;
        let mut report = IngestReport::new(DocumentKind::WritingTarea1, folder, files.len(), dry_run);

        info!(folder = %folder.display(), files = files.len(), dry_run, "Parsing writing tarea 1 documents");

        for (idx, path) in files.iter().enumerate() {
            let file = file_name(path);
            info!("[{}/{}] Processing {}", idx + 1, files.len(), file);

            match self.ingest_writing_file(path, &file, module_type_id, dry_run).await {
                Ok(document) => report.record_success(document),
                Err(e) => {
                    warn!(file = %file, error = %e, "Failed to ingest document");
                    report.record_failure(file, &e);
                }
            }
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "Writing tarea 1 ingest finished"
        );
        Ok(report)
    }

    pub async fn ingest_oral(
        &self,
        folder: &Path,
        module_type_id: i32,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<IngestReport, DocumentError> {
        let files = list_docx_files(folder, limit)?;
        let mut report = IngestReport::new(DocumentKind::OralTarea2, folder, files.len(), dry_run);

        info!(folder = %folder.display(), files = files.len(), dry_run, "Parsing oral tarea 2 documents");

        for path in &files {
            let file = file_name(path);
            match self.ingest_oral_file(path, &file, module_type_id, dry_run).await {
                Ok(document) => report.record_success(document),
                Err(e) => {
                    warn!(file = %file, error = %e, "Failed to ingest document");
                    report.record_failure(file, &e);
                }
            }
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "Oral tarea 2 ingest finished"
        );
        Ok(report)
    }

    /// Recreates the writing tables from scratch and loads the whole folder.
    pub async fn rebuild_writing(
        &self,
        folder: &Path,
        module_type_id: i32,
    ) -> Result<IngestReport, DocumentError> {
        if !folder.is_dir() {
            return Err(DocumentError::FolderNotFound(folder.display().to_string()));
        }

        warn!("Dropping and recreating writing tarea 1 tables");
        self.store.recreate_writing_tables().await?;

        self.ingest_writing(folder, module_type_id, None, false).await
    }

    async fn ingest_writing_file(
        &self,
        path: &Path,
        file: &str,
        module_type_id: i32,
        dry_run: bool,
    ) -> Result<IngestedDocument, DocumentError> {
        let lines = self.reader.read_lines(path).await?;
        let mut tarea = parse_writing_tarea1_lines(&lines);

        if tarea.situation.is_none() && tarea.task_instructions.is_none() {
            warn!(file, "No situation or task found, keeping the full text");
            tarea.situation = Some(tarea.full_raw_text.clone());
            tarea.mode = SegmentationMode::RawText;
        }
        if tarea.title.is_none() {
            tarea.title = Some(file.to_string());
        }

        let set_id = if dry_run {
            None
        } else {
            Some(self.store.insert_writing_tarea1(&tarea, module_type_id).await?)
        };

        Ok(IngestedDocument {
            file: file.to_string(),
            set_id,
            title: tarea.title.clone(),
            mode: Some(tarea.mode),
            solution_chars: tarea.solution_text.as_deref().map_or(0, |s| s.chars().count()),
            total_chars: tarea.full_raw_text.chars().count(),
        })
    }

    async fn ingest_oral_file(
        &self,
        path: &Path,
        file: &str,
        module_type_id: i32,
        dry_run: bool,
    ) -> Result<IngestedDocument, DocumentError> {
        let lines = self.reader.read_lines(path).await?;
        let tarea = parse_oral_tarea2_lines(&lines, file)?;

        let set_id = if dry_run {
            None
        } else {
            Some(
                self.store
                    .insert_oral_tarea2(&tarea, module_type_id, DEFAULT_ORAL_INSTRUCTIONS)
                    .await?,
            )
        };

        Ok(IngestedDocument {
            file: file.to_string(),
            set_id,
            title: None,
            mode: None,
            solution_chars: tarea.solution_text.chars().count(),
            total_chars: lines.iter().map(|l| l.chars().count()).sum(),
        })
    }
}

/// `*.docx` files directly inside `folder`, sorted by name. Word lock files
/// (`~$...`) are skipped.
fn list_docx_files(folder: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>, DocumentError> {
    if !folder.is_dir() {
        return Err(DocumentError::FolderNotFound(folder.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_docx = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("docx"))
            .unwrap_or(false);
        if is_docx && path.is_file() && !file_name(&path).starts_with("~$") {
            files.push(path);
        }
    }

    files.sort_by_key(|path| file_name(path));
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
