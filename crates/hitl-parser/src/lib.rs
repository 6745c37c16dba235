//! HITL Parser - Document text extraction
//!
//! Supports parsing of:
//! - PDF documents
//! - Plain text and Markdown files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument`: the text of every page that yielded any, from which
//! the line sequence and the full text used by field extraction derive.

use std::path::Path;
use thiserror::Error;

pub mod pdf;

pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted page texts
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Original file path
    pub file_path: String,

    /// Detected file type
    pub file_type: FileType,

    /// Text of each page that produced any; blank pages are dropped
    pub pages: Vec<String>,
}

impl ParsedDocument {
    /// Create an empty parsed document
    pub fn new(file_path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            pages: Vec::new(),
        }
    }

    /// Add a page, ignoring pages without text
    pub fn push_page(&mut self, text: &str) {
        let text = text.trim_end_matches(['\n', '\r']);
        if !text.trim().is_empty() {
            self.pages.push(text.to_string());
        }
    }

    /// Add a page (builder form)
    pub fn with_page(mut self, text: &str) -> Self {
        self.push_page(text);
        self
    }

    /// All lines of all pages, in reading order
    pub fn lines(&self) -> Vec<&str> {
        self.pages.iter().flat_map(|page| page.lines()).collect()
    }

    /// Concatenation of every page, each followed by a newline
    pub fn full_text(&self) -> String {
        let mut text = String::new();
        for page in &self.pages {
            text.push_str(page);
            text.push('\n');
        }
        text
    }

    /// Number of pages with text
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "txt" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the PDF and plain text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        parser.parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text Parser
// ============================================================================

/// Plain text parser; form feeds separate pages
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        let content =
            String::from_utf8(bytes).map_err(|e| ParserError::EncodingError(e.to_string()))?;

        let file_type = match FileType::from_path(path) {
            FileType::Markdown => FileType::Markdown,
            _ => FileType::PlainText,
        };

        let mut doc = ParsedDocument::new(path.display().to_string(), file_type);
        for page in content.split('\x0C') {
            doc.push_page(page);
        }
        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("docx"), FileType::Unknown);
    }

    #[test]
    fn test_lines_and_full_text() {
        let doc = ParsedDocument::new("cv.pdf", FileType::Pdf)
            .with_page("Jane Doe\nData Scientist\n")
            .with_page("   \n")
            .with_page("Skills: python");

        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.lines(), vec!["Jane Doe", "Data Scientist", "Skills: python"]);
        assert_eq!(doc.full_text(), "Jane Doe\nData Scientist\nSkills: python\n");
    }

    #[test]
    fn test_plain_text_parser_pages() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Page one\r\nline two\x0C\x0CPage three").unwrap();

        let doc = PlainTextParser.parse(file.path()).unwrap();
        assert_eq!(doc.file_type, FileType::PlainText);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.lines(), vec!["Page one", "line two", "Page three"]);
    }

    #[test]
    fn test_registry_rejects_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("resume.docx")).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(ext) if ext == "docx"));
    }

    #[test]
    fn test_registry_missing_file() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("/nonexistent/cv.txt")).unwrap_err();
        assert!(matches!(err, ParserError::IoError { .. }));
    }
}
