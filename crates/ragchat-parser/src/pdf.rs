//! PDF document parser using pdf-extract
//!
//! Extracts the text of every page; pages are separated by form feeds in
//! the extracted output. pdf-extract panics on some malformed files, so
//! extraction runs under `catch_unwind` and a panic becomes a parse error.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
#[derive(Debug, Default)]
pub struct PdfParser;

impl PdfParser {
    /// Create a new PDF parser
    pub fn new() -> Self {
        Self
    }

    /// Extract text from PDF bytes
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<String> {
        contain_panic(|| {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ParserError::PdfError(e.to_string()))
        })
    }
}

/// Run `extract`, turning a panic into [`ParserError::PdfError`]
fn contain_panic<T>(extract: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(extract)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ParserError::PdfError(format!("extractor panicked: {msg}")))
        }
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let text = self.extract_from_bytes(&bytes)?;
        Ok(ParsedDocument::new(path.display().to_string(), FileType::Pdf).with_content(text))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}
