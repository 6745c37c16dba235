//! PDF document parser using pdf-extract
//!
//! Extracts the text of each page. pdf-extract separates pages with form
//! feeds and pads paragraphs with blank lines; both are normalized away so
//! that callers see one entry per text line.

use std::path::Path;

use tracing::debug;

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
pub struct PdfParser {
    /// Keep blank lines inside a page
    pub keep_blank_lines: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            keep_blank_lines: false,
        }
    }

    /// Keep blank lines as extracted
    pub fn with_blank_lines(mut self, keep: bool) -> Self {
        self.keep_blank_lines = keep;
        self
    }

    /// Extract raw text from a PDF file
    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        // pdf-extract panics on some malformed documents (e.g. fonts
        // referenced without a /Resources entry)
        match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
            Ok(text) => text.map_err(|e| ParserError::PdfError(e.to_string())),
            Err(payload) => Err(ParserError::PdfError(format!(
                "PDF extraction panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Split raw text into normalized page texts
    fn split_pages(&self, text: &str) -> Vec<String> {
        text.split('\x0C')
            .map(|page| {
                if self.keep_blank_lines {
                    page.to_string()
                } else {
                    page.lines()
                        .filter(|line| !line.trim().is_empty())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let text = self.extract_text(path)?;

        let mut doc = ParsedDocument::new(path.display().to_string(), FileType::Pdf);
        for page in self.split_pages(&text) {
            doc.push_page(&page);
        }

        debug!(path = %path.display(), pages = doc.page_count(), "Parsed PDF");
        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}
