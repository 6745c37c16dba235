//! Role inference over the persisted classifier
//!
//! The model file is read on every prediction so that a retrain is picked up
//! without restarting. A missing file is a cold start, not an error.

use std::path::{Path, PathBuf};

use hitl_core::{ExtractedRecord, ModelConfig, UNKNOWN_ROLE};
use hitl_model::{ModelError, TextClassifier};
use tracing::{debug, info, warn};

/// Predicts a role label from a skills string
#[derive(Debug, Clone)]
pub struct RolePredictor {
    model_path: PathBuf,
}

impl RolePredictor {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.path.clone())
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Whether a trained model is available
    pub fn model_exists(&self) -> bool {
        self.model_path.is_file()
    }

    /// Predict a role; `Ok(None)` when no model has been trained yet
    pub fn predict(&self, skills: &str) -> Result<Option<String>, ModelError> {
        if !self.model_exists() {
            return Ok(None);
        }

        let model = TextClassifier::load(&self.model_path)?;
        let role = model.predict_one(skills)?;
        debug!(role = %role, "Predicted role");
        Ok(Some(role))
    }

    /// Predicted role, or the unknown label on cold start or failure
    pub fn predict_or_unknown(&self, skills: &str) -> String {
        match self.predict(skills) {
            Ok(Some(role)) => role,
            Ok(None) => {
                info!(path = %self.model_path.display(), "No trained model yet (cold start)");
                UNKNOWN_ROLE.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Role prediction failed");
                UNKNOWN_ROLE.to_string()
            }
        }
    }

    /// Fill `record.predicted_role` from its skills; on failure the
    /// existing label is kept
    pub fn apply(&self, record: &mut ExtractedRecord) {
        match self.predict(&record.skills) {
            Ok(Some(role)) => record.predicted_role = role,
            Ok(None) => {
                info!(path = %self.model_path.display(), "No trained model yet (cold start)");
            }
            Err(e) => {
                warn!(error = %e, path = %self.model_path.display(), "Role prediction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_model::ForestParams;

    fn train(path: &Path) {
        let texts = [
            "python sql",
            "python docker",
            "marketing communication",
            "management communication",
        ];
        let labels = ["Data", "Data", "Sales", "Sales"];
        TextClassifier::fit(&texts, &labels, ForestParams::new(20, 42))
            .unwrap()
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = RolePredictor::new(dir.path().join("missing.json"));

        assert!(!predictor.model_exists());
        assert_eq!(predictor.predict("python").unwrap(), None);
        assert_eq!(predictor.predict_or_unknown("python"), UNKNOWN_ROLE);

        let mut record = ExtractedRecord::new();
        predictor.apply(&mut record);
        assert_eq!(record.predicted_role, UNKNOWN_ROLE);
    }

    #[test]
    fn test_predict_with_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        train(&path);

        let predictor = RolePredictor::new(&path);
        let role = predictor.predict("python, sql").unwrap().unwrap();
        assert!(role == "Data" || role == "Sales");

        let mut record = ExtractedRecord::new();
        record.skills = "python, sql".to_string();
        predictor.apply(&mut record);
        assert_eq!(record.predicted_role, role);
    }

    #[test]
    fn test_corrupt_model_keeps_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"garbage").unwrap();

        let predictor = RolePredictor::new(&path);
        assert!(predictor.predict("python").is_err());
        assert_eq!(predictor.predict_or_unknown("python"), UNKNOWN_ROLE);

        let mut record = ExtractedRecord::new();
        record.predicted_role = "Manager".to_string();
        predictor.apply(&mut record);
        assert_eq!(record.predicted_role, "Manager");
    }

    #[test]
    fn test_inconsistent_model_keeps_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        // Two forest classes but a single label
        std::fs::write(
            &path,
            r#"{
                "vectorizer": {"vocabulary": {"python": 0}},
                "forest": {
                    "params": {"n_estimators": 1, "random_state": 42, "max_depth": null, "min_samples_split": 2},
                    "n_classes": 2,
                    "n_features": 1,
                    "trees": [{"nodes": [{"Leaf": {"distribution": [0.0, 1.0]}}]}]
                },
                "classes": ["A"]
            }"#,
        )
        .unwrap();

        let predictor = RolePredictor::new(&path);
        assert!(matches!(
            predictor.predict("python"),
            Err(ModelError::InvalidModel(_))
        ));
        assert_eq!(predictor.predict_or_unknown("python"), UNKNOWN_ROLE);

        let mut record = ExtractedRecord::new();
        record.skills = "python".to_string();
        record.predicted_role = "Manager".to_string();
        predictor.apply(&mut record);
        assert_eq!(record.predicted_role, "Manager");
    }
}
