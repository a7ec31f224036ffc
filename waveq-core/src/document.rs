//! PDF text extraction

use crate::error::{Error, Result};
use std::path::Path;
use tracing::info;

/// Default output file for extracted text
pub const DEFAULT_TEXT_OUTPUT: &str = "texto_extraido_do_pdf.txt";

/// Extract the text of every page of a PDF.
pub fn extract_pdf_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::file_not_found(path.display().to_string()));
    }

    // the parser panics on some malformed files instead of returning an error
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path)).map_err(|_| {
        Error::extraction_failed("PDF parser aborted on a malformed document")
            .with_context("path", path.display().to_string())
    })?;

    let text = extracted.map_err(|e| {
        Error::extraction_failed(e.to_string())
            .with_operation("document::extract_pdf_text")
            .with_context("path", path.display().to_string())
    })?;

    info!(path = %path.display(), chars = text.len(), "extracted PDF text");
    Ok(text)
}

/// Write `text` as UTF-8, replacing any existing file.
pub fn save_text(out: impl AsRef<Path>, text: &str) -> Result<()> {
    let out = out.as_ref();
    std::fs::write(out, text.as_bytes()).map_err(|e| {
        Error::from(e)
            .with_operation("document::save_text")
            .with_context("path", out.display().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_missing_pdf() {
        let err = extract_pdf_text("/nonexistent/manual.pdf").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_garbage_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = extract_pdf_text(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
    }

    #[test]
    fn test_save_text_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(DEFAULT_TEXT_OUTPUT);
        save_text(&out, "Análise de vibração").unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Análise de vibração");
    }
}
