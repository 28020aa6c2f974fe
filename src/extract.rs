//! Text extraction for ingested documents.
//!
//! The ingester supplies raw bytes plus the file extension; this module
//! returns plain UTF-8 text. Extraction failures are per-file errors — the
//! pipeline skips the file and moves on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: .{0}")]
    UnsupportedFileType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8")]
    Utf8,
}

/// Extract plain text from file bytes, keyed on the (lowercased) extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => extract_pdf(bytes),
        "md" | "txt" => {
            String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Utf8)
        }
        other => Err(ExtractError::UnsupportedFileType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
