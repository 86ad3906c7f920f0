// .docx text extraction.
//
// A .docx file is a zip container of WordprocessingML parts. Text is collected
// in this order: top-level body paragraphs, table cells, header parts, footer
// parts. Every collected block is split into trimmed, non-empty lines.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Read, Seek};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

use crate::core::documents::{DocumentError, DocumentReader};

const MAIN_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("not a valid .docx archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads .docx files from disk on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxReader;

impl DocxReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentReader for DocxReader {
    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, DocumentError> {
        let path = path.to_path_buf();
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let lines = tokio::task::spawn_blocking(move || {
            let archive = std::fs::File::open(&path)?;
            extract_docx_lines(archive)
        })
        .await
        .map_err(|e| DocumentError::Read {
            file: file.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| DocumentError::Read {
            file: file.clone(),
            reason: e.to_string(),
        })?;

        debug!(file = %file, lines = lines.len(), "Extracted document text");
        Ok(lines)
    }
}

/// Extracts every line of text from a .docx archive.
pub fn extract_docx_lines<R: Read + Seek>(reader: R) -> Result<Vec<String>, DocxError> {
    let mut archive = ZipArchive::new(reader)?;

    let main = read_part(&mut archive, MAIN_PART)?;
    let body = collect_text(&main)?;

    let mut blocks = body.paragraphs;
    blocks.extend(body.cells);

    for kind in ["word/header", "word/footer"] {
        let mut parts: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with(kind) && name.ends_with(".xml"))
            .map(str::to_string)
            .collect();
        parts.sort();

        for part in parts {
            let xml = read_part(&mut archive, &part)?;
            blocks.extend(collect_text(&xml)?.paragraphs);
        }
    }

    Ok(blocks
        .iter()
        .flat_map(|block| block.split('\n'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, DocxError> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

#[derive(Debug, Default)]
struct PartText {
    /// Paragraphs outside any table, in document order.
    paragraphs: Vec<String>,
    /// One entry per table cell, its paragraphs joined by newlines.
    cells: Vec<String>,
}

fn collect_text(xml: &str) -> Result<PartText, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut out = PartText::default();

    let mut paragraph = String::new();
    let mut cells: Vec<Vec<String>> = Vec::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => paragraph.clear(),
                b"r" => in_run = true,
                b"t" => in_text = true,
                b"tc" => cells.push(Vec::new()),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if in_run => paragraph.push('\t'),
                b"br" | b"cr" if in_run => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => {
                    let text = paragraph.trim().to_string();
                    match cells.last_mut() {
                        Some(cell) => cell.push(text),
                        None if !text.is_empty() => out.paragraphs.push(text),
                        None => {}
                    }
                    paragraph.clear();
                }
                b"tc" => {
                    if let Some(cell) = cells.pop() {
                        let text = cell.join("\n").trim().to_string();
                        if !text.is_empty() {
                            out.cells.push(text);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn para(text: &str) -> String {
        format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text)
    }

    fn build_docx(parts: &[(&str, String)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_extraction_order_body_tables_headers_footers() {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <w:document {ns}><w:body>
                {title}
                <w:tbl><w:tr>
                    <w:tc>{cell_a}{cell_b}</w:tc>
                    <w:tc><w:p/></w:tc>
                </w:tr></w:tbl>
                <w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>
                    <w:r><w:t>Situación:</w:t><w:tab/><w:t>Usted &amp; su amigo</w:t></w:r></w:p>
                <w:p/>
            </w:body></w:document>"#,
            ns = NS,
            title = para("  Carta formal  "),
            cell_a = para("Celda uno"),
            cell_b = para("Celda dos"),
        );
        let header = format!(r#"<w:hdr {}>{}</w:hdr>"#, NS, para("Cabecera"));
        let footer = format!(r#"<w:ftr {}>{}</w:ftr>"#, NS, para("Pie"));

        let docx = build_docx(&[
            ("word/footer1.xml", footer),
            ("word/document.xml", document),
            ("word/header1.xml", header),
        ]);

        let lines = extract_docx_lines(docx).unwrap();

        assert_eq!(
            lines,
            vec![
                "Carta formal",
                "Situación:\tUsted & su amigo",
                "Celda uno",
                "Celda dos",
                "Cabecera",
                "Pie",
            ]
        );
    }

    #[test]
    fn test_line_breaks_split_paragraphs() {
        let document = format!(
            r#"<w:document {}><w:body><w:p><w:r><w:t>Image_url</w:t><w:br/><w:t>https://i/1.jpg</w:t></w:r></w:p></w:body></w:document>"#,
            NS
        );
        let docx = build_docx(&[("word/document.xml", document)]);

        assert_eq!(
            extract_docx_lines(docx).unwrap(),
            vec!["Image_url", "https://i/1.jpg"]
        );
    }

    #[test]
    fn test_missing_main_part_is_an_error() {
        let docx = build_docx(&[("word/styles.xml", "<w:styles/>".to_string())]);
        assert!(matches!(extract_docx_lines(docx), Err(DocxError::Zip(_))));
    }

    #[tokio::test]
    async fn test_reader_reports_file_name_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        let err = DocxReader::new().read_lines(&path).await.unwrap_err();
        match err {
            DocumentError::Read { file, .. } => assert_eq!(file, "roto.docx"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
