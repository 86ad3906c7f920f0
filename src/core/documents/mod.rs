pub mod document_models;
pub mod ingest_service;
pub mod oral_parser;
pub mod writing_parser;

pub use document_models::{
    DocumentError, DocumentKind, FileError, IngestReport, IngestedDocument, ParsedOralTarea,
    ParsedWritingTarea, SectionKind, SegmentationMode,
};
pub use ingest_service::{DocumentReader, IngestService, TareaStore};
pub use oral_parser::{parse_oral_tarea2_lines, DEFAULT_ORAL_INSTRUCTIONS};
pub use writing_parser::parse_writing_tarea1_lines;
