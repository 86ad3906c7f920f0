use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {file}: {reason}")]
    Read { file: String, reason: String },

    #[error("Missing {field} in {file}")]
    MissingField { field: &'static str, file: String },

    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Section categories a writing document is segmented into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Situation,
    Task,
    Solution,
    Reminder,
}

/// How the sections of a writing document were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Spans between recognised headings.
    #[default]
    Headings,
    /// No usable headings: fixed 30/30/40 split of the body.
    Proportional,
    /// Nothing recognisable: the whole text is kept as the situation.
    RawText,
}

/// Fields extracted from one writing tarea 1 document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedWritingTarea {
    pub title: Option<String>,
    pub situation: Option<String>,
    pub task_instructions: Option<String>,
    pub word_limit: Option<String>,
    pub text_type: Option<String>,
    pub register: Option<String>,
    pub reminders: Option<String>,
    pub audio_url: Option<String>,
    pub solution_text: Option<String>,
    /// Every extracted line, kept so nothing in the document is lost.
    pub full_raw_text: String,
    pub mode: SegmentationMode,
}

impl ParsedWritingTarea {
    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Option<String> {
        match kind {
            SectionKind::Situation => &mut self.situation,
            SectionKind::Task => &mut self.task_instructions,
            SectionKind::Solution => &mut self.solution_text,
            SectionKind::Reminder => &mut self.reminders,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedOralTarea {
    pub image_url: String,
    pub audio_url: String,
    pub solution_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    WritingTarea1,
    OralTarea2,
}

/// One file that was parsed (and inserted, unless it was a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedDocument {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SegmentationMode>,
    pub solution_chars: usize,
    pub total_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub kind: DocumentKind,
    pub folder: String,
    pub dry_run: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub documents: Vec<IngestedDocument>,
    pub errors: Vec<FileError>,
}

impl IngestReport {
    pub fn new(kind: DocumentKind, folder: &Path, total: usize, dry_run: bool) -> Self {
        Self {
            kind,
            folder: folder.display().to_string(),
            dry_run,
            total,
            successful: 0,
            failed: 0,
            documents: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self, document: IngestedDocument) {
        self.successful += 1;
        self.documents.push(document);
    }

    pub fn record_failure(&mut self, file: String, error: &DocumentError) {
        self.failed += 1;
        self.errors.push(FileError {
            file,
            error: error.to_string(),
        });
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.successful == self.total
    }
}
