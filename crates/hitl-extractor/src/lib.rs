//! HITL Extractor - CV field extraction and role inference
//!
//! This crate turns a document into an [`ExtractedRecord`]:
//! - Rule-based field extraction (regex patterns and keyword dictionaries)
//! - Role prediction with the persisted classifier, when one exists
//!
//! Extraction never fails: unreadable documents produce an all-default
//! record and a warning.

pub mod fields;
pub mod inference;

pub use fields::{KeywordSets, RuleBasedExtractor};
pub use inference::RolePredictor;

use std::path::Path;

use hitl_core::{ExtractedRecord, ModelConfig};
use hitl_parser::{ParsedDocument, ParserRegistry};
use tracing::{info, warn};

// ============================================================================
// Extractor Trait
// ============================================================================

/// Trait for field extractors
pub trait RecordExtractor: Send + Sync {
    /// Build a record from the document's lines and its full text
    fn extract(&self, lines: &[&str], full_text: &str) -> ExtractedRecord;

    /// Build a record from a parsed document
    fn extract_document(&self, document: &ParsedDocument) -> ExtractedRecord {
        let full_text = document.full_text();
        self.extract(&document.lines(), &full_text)
    }
}

// ============================================================================
// Extraction Service
// ============================================================================

/// Parser, field extractor and role predictor composed end to end
pub struct ExtractionService {
    parsers: ParserRegistry,
    extractor: Box<dyn RecordExtractor>,
    predictor: RolePredictor,
}

impl ExtractionService {
    /// Service with the default parsers and keyword dictionaries
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            parsers: ParserRegistry::with_defaults(),
            extractor: Box::new(RuleBasedExtractor::new()),
            predictor: RolePredictor::from_config(config),
        }
    }

    /// Replace the field extractor
    pub fn with_extractor<E: RecordExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn predictor(&self) -> &RolePredictor {
        &self.predictor
    }

    /// Extract a record from a file
    pub fn extract_file(&self, path: &Path) -> ExtractedRecord {
        let mut record = match self.parsers.parse(path) {
            Ok(document) => {
                info!(
                    path = %path.display(),
                    pages = document.page_count(),
                    "Parsed document"
                );
                self.extractor.extract_document(&document)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Document parsing failed");
                ExtractedRecord::new()
            }
        };

        self.predictor.apply(&mut record);
        record
    }

    /// Extract a record from already extracted text
    pub fn extract_text(&self, text: &str) -> ExtractedRecord {
        let lines: Vec<&str> = text.lines().collect();
        let mut record = self.extractor.extract(&lines, text);
        self.predictor.apply(&mut record);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_core::{NOT_FOUND, UNKNOWN_ROLE};
    use hitl_parser::FileType;

    fn service(dir: &Path) -> ExtractionService {
        ExtractionService::new(&ModelConfig {
            path: dir.join("model.json"),
            ..ModelConfig::default()
        })
    }

    #[test]
    fn test_extract_document_joins_pages() {
        let document = ParsedDocument::new("cv.pdf", FileType::Pdf)
            .with_page("Jean Dupont\n")
            .with_page("Skills: Linux, Git");

        let record = RuleBasedExtractor::new().extract_document(&document);
        assert_eq!(record.name, "Jean Dupont");
        assert_eq!(record.skills, "linux, git");
    }

    #[test]
    fn test_unreadable_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let record = service(dir.path()).extract_file(&dir.path().join("missing.pdf"));

        assert_eq!(record.name, NOT_FOUND);
        assert_eq!(record.skills, "");
        assert_eq!(record.predicted_role, UNKNOWN_ROLE);
    }

    #[test]
    fn test_unsupported_format_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.docx");
        std::fs::write(&path, b"Jean Dupont").unwrap();

        let record = service(dir.path()).extract_file(&path);
        assert_eq!(record.name, NOT_FOUND);
    }

    #[test]
    fn test_extract_text() {
        let dir = tempfile::tempdir().unwrap();
        let record = service(dir.path()).extract_text("Ada Lovelace\nada@example.org");
        assert_eq!(record.name, "Ada Lovelace");
        assert_eq!(record.email, "ada@example.org");
        assert_eq!(record.predicted_role, UNKNOWN_ROLE);
    }
}
