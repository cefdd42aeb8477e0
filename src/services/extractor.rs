// Text Extraction Service
// Turns an uploaded .txt/.docx/.pdf file into one normalized text blob

use docx_rs::{DocumentChild, InsertChild, ParagraphChild, Run, RunChild};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::text_processor::normalize_punctuation;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid docx archive: {0}")]
    Docx(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Declared document type, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Docx,
    Pdf,
    Unknown,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Self::Text,
            "docx" => Self::Docx,
            "pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }
}

/// Read `path` and return its normalized text.
///
/// Unrecognized extensions are read as raw text, lossily decoded.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    let kind = DocumentKind::from_path(path);
    debug!(path = %path.display(), ?kind, bytes = bytes.len(), "extract.start");

    let raw = match kind {
        DocumentKind::Text | DocumentKind::Unknown => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentKind::Docx => extract_docx_text(&bytes)?,
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
    };

    Ok(normalize_punctuation(&raw))
}

/// Body paragraph text, one line per paragraph. Tables and other
/// non-paragraph blocks are skipped.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(p) => Some(paragraph_text(&p.children)),
            _ => None,
        })
        .collect();

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut out = String::new();
    for child in children {
        match child {
            ParagraphChild::Run(run) => push_run_text(run, &mut out),
            ParagraphChild::Insert(insert) => {
                for child in &insert.children {
                    if let InsertChild::Run(run) = child {
                        push_run_text(run, &mut out);
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => out.push_str(&paragraph_text(&link.children)),
            _ => {}
        }
    }
    out
}

fn push_run_text(run: &Run, out: &mut String) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) | RunChild::CarriageReturn(_) => out.push('\n'),
            _ => {}
        }
    }
}
