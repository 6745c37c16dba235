//! HITL Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for local use. Every component receives the section it
//! needs explicitly instead of reading global state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Document and correction storage
    pub storage: StorageConfig,

    /// Persisted role classifier
    pub model: ModelConfig,

    /// Retraining policy
    pub training: TrainingConfig,

    /// Experiment tracking
    pub tracking: TrackingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Storage
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Some(n) = env_parse("DATABASE_MAX_CONNECTIONS")? {
            self.storage.max_connections = n;
        }

        // Model
        if let Ok(path) = std::env::var("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(n) = env_parse("MODEL_N_ESTIMATORS")? {
            self.model.n_estimators = n;
        }
        if let Some(seed) = env_parse("MODEL_RANDOM_STATE")? {
            self.model.random_state = seed;
        }

        // Training
        if let Some(n) = env_parse("TRAINING_MIN_EXAMPLES")? {
            self.training.min_examples = n;
        }
        if let Some(size) = env_parse("TRAINING_TEST_SIZE")? {
            self.training.test_size = size;
        }

        // Tracking
        if let Some(enabled) = env_parse("TRACKING_ENABLED")? {
            self.tracking.enabled = enabled;
        }
        if let Ok(dir) = std::env::var("TRACKING_DIR") {
            self.tracking.dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("TRACKING_EXPERIMENT") {
            self.tracking.experiment = name;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "training.test_size".to_string(),
                value: self.training.test_size.to_string(),
            });
        }
        if self.model.n_estimators == 0 {
            return Err(ConfigError::InvalidValue {
                key: "model.n_estimators".to_string(),
                value: "0".to_string(),
            });
        }
        if self.training.min_examples < 2 {
            return Err(ConfigError::InvalidValue {
                key: "training.min_examples".to_string(),
                value: self.training.min_examples.to_string(),
            });
        }
        if self.training.max_cv_folds < 2 {
            return Err(ConfigError::InvalidValue {
                key: "training.max_cv_folds".to_string(),
                value: self.training.max_cv_folds.to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite connection URL
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://hitl.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Role classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Where the fitted pipeline is written; overwritten on every retrain
    pub path: PathBuf,

    /// Number of trees in the forest
    pub n_estimators: usize,

    /// Seed for bootstrap sampling, feature sampling and data splits
    pub random_state: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model_hitl.json"),
            n_estimators: 100,
            random_state: 42,
        }
    }
}

/// Retraining policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Minimum number of labelled corrections before a model is fitted
    pub min_examples: usize,

    /// Fraction of examples held out for evaluation
    pub test_size: f64,

    /// Upper bound on cross-validation folds
    pub max_cv_folds: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_examples: 3,
            test_size: 0.3,
            max_cv_folds: 3,
        }
    }
}

/// Experiment tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Record runs at all
    pub enabled: bool,

    /// Root directory of the run store
    pub dir: PathBuf,

    /// Experiment name (one sub-directory per experiment)
    pub experiment: String,

    /// Scratch directory for artifacts before they are recorded
    pub scratch_dir: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("mlruns"),
            experiment: "hitl-role-classifier".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.n_estimators, 100);
        assert_eq!(config.model.random_state, 42);
        assert_eq!(config.training.min_examples, 3);
        assert!((config.training.test_size - 0.3).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\npath = \"/tmp/role.json\"\nn_estimators = 50\n\n[training]\ntest_size = 0.2"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model.path, PathBuf::from("/tmp/role.json"));
        assert_eq!(config.model.n_estimators, 50);
        assert_eq!(config.model.random_state, 42);
        assert!((config.training.test_size - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.storage.database_url, "sqlite://hitl.db");
    }

    #[test]
    fn test_invalid_test_size_rejected() {
        let mut config = AppConfig::default();
        config.training.test_size = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_min_examples_below_two_rejected() {
        for min_examples in [0, 1] {
            let mut config = AppConfig::default();
            config.training.min_examples = min_examples;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { key, .. }) if key == "training.min_examples"
            ));
        }

        let mut config = AppConfig::default();
        config.training.min_examples = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/hitl.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
