//! HITL Trainer - Role classifier retraining
//!
//! Turns accumulated human corrections into a new role classifier:
//! - Dataset building from stored corrections
//! - Small-data split policy and cross-validation
//! - Held-out evaluation (weighted metrics, confusion matrix)
//! - Model persistence and experiment tracking
//!
//! Insufficient data is reported through [`TrainingStatus`], never as an
//! error.

pub mod dataset;
pub mod metrics;
pub mod pipeline;
pub mod selection;
pub mod tracking;

pub use dataset::{Dataset, TrainingExample};
pub use metrics::{ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use pipeline::TrainingPipeline;
pub use selection::{KFold, Split, StratifiedKFold};
pub use tracking::{ExperimentTracker, FileTracker, MemoryTracker, TrackingError, TrainingRun};

use hitl_core::HitlError;
use hitl_model::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Failures inside a training run
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("storage error: {0}")]
    Storage(#[from] HitlError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("confusion matrix unavailable: {0}")]
    ConfusionMatrix(String),

    #[error("failed to render confusion matrix: {0}")]
    Render(String),

    #[error("I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TrainingError>;

// ============================================================================
// Training Report
// ============================================================================

/// Outcome of a retrain request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Success,
    NoData,
    InsufficientData,
    Error,
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoData => write!(f, "no_data"),
            Self::InsufficientData => write!(f, "insufficient_data"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How the data was split for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "split", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Stratified held-out split and stratified k-fold
    Stratified { folds: usize },
    /// Shuffled held-out split and plain k-fold
    Shuffled { folds: usize },
}

impl SplitStrategy {
    /// Stratify only when every class has at least two examples
    pub fn for_min_class(min_class: usize, max_folds: usize) -> Self {
        if min_class >= 2 {
            Self::Stratified {
                folds: min_class.min(max_folds).max(2),
            }
        } else {
            Self::Shuffled { folds: 2 }
        }
    }

    pub fn folds(&self) -> usize {
        match self {
            Self::Stratified { folds } | Self::Shuffled { folds } => *folds,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stratified { .. } => "stratified",
            Self::Shuffled { .. } => "shuffled",
        }
    }
}

/// Result of [`TrainingPipeline::run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub status: TrainingStatus,

    /// Mean cross-validation accuracy, on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_accuracy: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Usable labelled examples
    pub dataset_size: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SplitStrategy>,

    /// Tracker run, when one was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl TrainingReport {
    fn with_status(status: TrainingStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            cv_accuracy: None,
            message: Some(message.into()),
            dataset_size: 0,
            strategy: None,
            run_id: None,
        }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::with_status(TrainingStatus::NoData, message)
    }

    pub fn insufficient_data(dataset_size: usize, message: impl Into<String>) -> Self {
        Self {
            dataset_size,
            ..Self::with_status(TrainingStatus::InsufficientData, message)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(TrainingStatus::Error, message)
    }

    pub fn success(
        cv_accuracy: f64,
        dataset_size: usize,
        strategy: SplitStrategy,
        run_id: Option<Uuid>,
    ) -> Self {
        Self {
            status: TrainingStatus::Success,
            cv_accuracy: Some(cv_accuracy),
            message: None,
            dataset_size,
            strategy: Some(strategy),
            run_id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrainingStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            SplitStrategy::for_min_class(2, 3),
            SplitStrategy::Stratified { folds: 2 }
        );
        assert_eq!(
            SplitStrategy::for_min_class(7, 3),
            SplitStrategy::Stratified { folds: 3 }
        );
        assert_eq!(
            SplitStrategy::for_min_class(1, 3),
            SplitStrategy::Shuffled { folds: 2 }
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = TrainingReport::success(0.75, 4, SplitStrategy::Stratified { folds: 2 }, None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["cv_accuracy"], 0.75);
        assert_eq!(json["strategy"]["split"], "stratified");
        assert_eq!(json["strategy"]["folds"], 2);
        assert!(json.get("run_id").is_none());

        let json = serde_json::to_value(TrainingReport::no_data("empty")).unwrap();
        assert_eq!(json["status"], "no_data");
        assert!(json.get("cv_accuracy").is_none());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TrainingStatus::InsufficientData.to_string(), "insufficient_data");
    }
}
