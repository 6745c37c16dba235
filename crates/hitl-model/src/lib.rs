//! HITL Model - Role classification pipeline
//!
//! A bag-of-words `CountVectorizer` feeding a seeded `RandomForest`,
//! wrapped as a `TextClassifier` that maps free text to string labels and
//! persists as a single JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod forest;
pub mod vectorizer;

pub use forest::{DecisionTree, ForestParams, RandomForest};
pub use vectorizer::{tokenize, CountVectorizer};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while fitting, using or persisting a model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("empty vocabulary; documents contain no usable tokens")]
    EmptyVocabulary,

    #[error("model is not fitted")]
    NotFitted,

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("inconsistent model: {0}")]
    InvalidModel(String),

    #[error("failed to access model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

// ============================================================================
// Text Classifier
// ============================================================================

/// Fitted vectorizer + forest pipeline over string labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextClassifier {
    vectorizer: CountVectorizer,
    forest: RandomForest,
    /// Sorted distinct labels; forest class `i` is `classes[i]`
    classes: Vec<String>,
}

impl TextClassifier {
    /// Fit the pipeline on parallel text and label slices
    pub fn fit<T, L>(texts: &[T], labels: &[L], params: ForestParams) -> Result<Self>
    where
        T: AsRef<str>,
        L: AsRef<str>,
    {
        if texts.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if texts.len() != labels.len() {
            return Err(ModelError::ShapeMismatch {
                expected: texts.len(),
                actual: labels.len(),
            });
        }

        let mut classes: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();

        let y: Vec<usize> = labels
            .iter()
            .map(|l| {
                classes
                    .binary_search_by(|c| c.as_str().cmp(l.as_ref()))
                    .unwrap_or_default()
            })
            .collect();

        let mut vectorizer = CountVectorizer::new();
        let x = vectorizer.fit_transform(texts)?;
        let forest = RandomForest::fit(&x, &y, classes.len(), params)?;

        debug!(
            samples = texts.len(),
            classes = classes.len(),
            features = vectorizer.vocabulary_size(),
            "Fitted text classifier"
        );

        Ok(Self {
            vectorizer,
            forest,
            classes,
        })
    }

    /// Predict one label per text
    pub fn predict<T: AsRef<str>>(&self, texts: &[T]) -> Result<Vec<String>> {
        let x = self.vectorizer.transform(texts)?;
        self.forest
            .predict(&x)?
            .into_iter()
            .map(|i| {
                self.classes.get(i).cloned().ok_or_else(|| {
                    ModelError::InvalidModel(format!("class index {i} has no label"))
                })
            })
            .collect()
    }

    /// Predict the label of a single text
    pub fn predict_one(&self, text: &str) -> Result<String> {
        self.predict(&[text])?
            .pop()
            .ok_or(ModelError::NotFitted)
    }

    /// Known labels in sorted order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn vectorizer(&self) -> &CountVectorizer {
        &self.vectorizer
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Write the fitted pipeline to `path`, replacing any previous file
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source: std::io::Error| ModelError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Load a pipeline written by [`TextClassifier::save`].
    ///
    /// The file is checked for internal consistency, so a hand-edited or
    /// truncated model is rejected here rather than at prediction time.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(ModelError::InvalidModel("no class labels".to_string()));
        }
        if self.classes.len() != self.forest.n_classes() {
            return Err(ModelError::InvalidModel(format!(
                "{} labels for {} forest classes",
                self.classes.len(),
                self.forest.n_classes()
            )));
        }
        if self.vectorizer.vocabulary_size() != self.forest.n_features() {
            return Err(ModelError::InvalidModel(format!(
                "vocabulary of {} tokens for {} forest features",
                self.vectorizer.vocabulary_size(),
                self.forest.n_features()
            )));
        }
        self.vectorizer.check()?;
        self.forest.check()
    }
}
