//! HITL Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the review loop:
//! - Extracted and corrected CV records
//! - Document review status
//! - Common error types
//! - Configuration management
//! - Document and correction storage (SQLite)

pub mod config;
pub mod store;

pub use config::{
    AppConfig, ConfigError, LoggingConfig, ModelConfig, StorageConfig, TrackingConfig,
    TrainingConfig,
};
pub use store::{CorrectionRepository, CorrectionRow, SqliteStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for HITL operations
#[derive(Error, Debug)]
pub enum HitlError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for HitlError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for HitlError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HitlError>;

// ============================================================================
// Sentinels
// ============================================================================

/// Placeholder for identity fields (name, email, phone) with no match.
///
/// Link fields default to an empty string instead; both conventions are
/// kept because stored records and the review UI rely on them.
pub const NOT_FOUND: &str = "Non trouvé";

/// Role label used before any model exists, and excluded from training.
pub const UNKNOWN_ROLE: &str = "Inconnu";

// ============================================================================
// Extracted Record
// ============================================================================

/// Flat set of candidate fields extracted from one CV.
///
/// Every field is populated independently; a field with no match keeps
/// its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub github: String,
    pub education: String,
    pub languages: String,
    pub skills: String,
    pub summary: String,
    pub predicted_role: String,

    /// Free-form experience blob, only ever filled in by a reviewer
    #[serde(skip_serializing_if = "String::is_empty")]
    pub experience: String,
}

impl Default for ExtractedRecord {
    fn default() -> Self {
        Self {
            name: NOT_FOUND.to_string(),
            email: NOT_FOUND.to_string(),
            phone: NOT_FOUND.to_string(),
            linkedin: String::new(),
            github: String::new(),
            education: String::new(),
            languages: String::new(),
            skills: String::new(),
            summary: String::new(),
            predicted_role: UNKNOWN_ROLE.to_string(),
            experience: String::new(),
        }
    }
}

impl ExtractedRecord {
    /// Create a record with every field at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a record from its stored JSON form
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode the record for storage
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Text used as the classifier input: skills, education and experience
    pub fn training_text(&self) -> String {
        [
            self.skills.as_str(),
            self.education.as_str(),
            self.experience.as_str(),
        ]
        .join(" ")
    }

    /// Whether the role carries a usable label
    pub fn has_known_role(&self) -> bool {
        let role = self.predicted_role.trim();
        !role.is_empty() && role != UNKNOWN_ROLE
    }
}

// ============================================================================
// Documents and Corrections
// ============================================================================

/// Review state of an ingested document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Validated,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = HitlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            _ => Err(HitlError::ValidationError(format!(
                "unknown document status: {s}"
            ))),
        }
    }
}

/// An ingested document and its current extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    pub status: DocumentStatus,
    pub ai_extraction: ExtractedRecord,
}

/// A human-corrected record; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: i64,
    pub document_id: i64,
    pub corrected_data: ExtractedRecord,
    pub timestamp: DateTime<Utc>,
    /// Seconds the reviewer spent on the correction
    pub time_taken: i64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = ExtractedRecord::new();
        assert_eq!(record.name, NOT_FOUND);
        assert_eq!(record.email, NOT_FOUND);
        assert_eq!(record.phone, NOT_FOUND);
        assert_eq!(record.linkedin, "");
        assert_eq!(record.github, "");
        assert_eq!(record.predicted_role, UNKNOWN_ROLE);
        assert!(!record.has_known_role());
    }

    #[test]
    fn test_record_partial_json() {
        let record =
            ExtractedRecord::from_json_str(r#"{"skills": "python", "predicted_role": "Dev", "extra": 1}"#)
                .unwrap();
        assert_eq!(record.skills, "python");
        assert_eq!(record.predicted_role, "Dev");
        assert_eq!(record.email, NOT_FOUND);
        assert!(record.has_known_role());
    }

    #[test]
    fn test_experience_omitted_when_empty() {
        let json = ExtractedRecord::new().to_json_string().unwrap();
        assert!(!json.contains("experience"));

        let record = ExtractedRecord {
            experience: "5 years backend".to_string(),
            ..Default::default()
        };
        assert!(record.to_json_string().unwrap().contains("experience"));
    }

    #[test]
    fn test_training_text() {
        let record = ExtractedRecord {
            skills: "python, sql".to_string(),
            education: "Master Data".to_string(),
            experience: "Analyst".to_string(),
            ..Default::default()
        };
        assert_eq!(record.training_text(), "python, sql Master Data Analyst");
    }

    #[test]
    fn test_blank_role_is_unknown() {
        let record = ExtractedRecord {
            predicted_role: "   ".to_string(),
            ..Default::default()
        };
        assert!(!record.has_known_role());
    }

    #[test]
    fn test_document_status_parse() {
        assert_eq!(
            "pending".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Pending
        );
        assert_eq!(
            "VALIDATED".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Validated
        );
        assert!("archived".parse::<DocumentStatus>().is_err());
        assert_eq!(DocumentStatus::Validated.to_string(), "validated");
    }
}
