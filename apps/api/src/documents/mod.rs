//! Document text extraction for uploaded job descriptions and résumés (PDF, DOCX).
//!
//! Parsing is CPU-bound, so the async entry point runs it inside
//! `tokio::task::spawn_blocking`.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

mod docx;

#[cfg(test)]
pub(crate) use docx::tests::build_docx;

/// Extensions accepted for upload, as shown to users.
pub const ALLOWED_EXTENSIONS: [&str; 2] = [".pdf", ".docx"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{file_name} has invalid extension. Only {} are allowed!", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedType { file_name: String },

    #[error("Could not read PDF: {0}")]
    Pdf(String),

    #[error("Could not read DOCX: {0}")]
    Docx(String),

    #[error("Document contains no extractable text")]
    Empty,

    #[error("Extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Determines the kind from the file extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Result<Self, ExtractionError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("docx") => Ok(DocumentKind::Docx),
            _ => Err(ExtractionError::UnsupportedType {
                file_name: file_name.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => f.write_str("pdf"),
            DocumentKind::Docx => f.write_str("docx"),
        }
    }
}

/// Extracts plain text synchronously. Fails if the bytes are not a valid document of `kind`.
pub fn extract_text(kind: DocumentKind, data: &[u8]) -> Result<String, ExtractionError> {
    let text = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(data)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?,
        DocumentKind::Docx => docx::extract_text(data)?,
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(text.to_string())
}

/// Async wrapper around [`extract_text`]. A panic inside the parser becomes an error.
pub async fn extract_document_text(
    kind: DocumentKind,
    data: Bytes,
) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extract_text(kind, &data))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}
