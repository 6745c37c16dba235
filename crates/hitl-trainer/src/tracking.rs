//! Experiment tracking
//!
//! A [`TrainingRun`] collects the params, metrics and artifact files of one
//! retrain. Trackers persist it: [`FileTracker`] lays runs out on disk as
//! `<dir>/<experiment>/<run-id>/{run.json, artifacts/}`, [`MemoryTracker`]
//! keeps them in memory.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("tracking I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TrackingError + '_ {
    move |source| TrackingError::Io {
        path: path.display().to_string(),
        source,
    }
}

// ============================================================================
// Training Run
// ============================================================================

/// Params, metrics and artifacts of one training invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: Uuid,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Local files to store with the run
    pub artifacts: Vec<PathBuf>,
}

impl TrainingRun {
    pub fn new(experiment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            experiment: experiment.into(),
            started_at: Utc::now(),
            finished_at: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn log_param(&mut self, key: &str, value: impl Display) {
        self.params.insert(key.to_string(), value.to_string());
    }

    pub fn log_metric(&mut self, key: &str, value: f64) {
        self.metrics.insert(key.to_string(), value);
    }

    pub fn log_artifact(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(path.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

// ============================================================================
// Trackers
// ============================================================================

/// Sink for finished training runs
pub trait ExperimentTracker: Send + Sync {
    /// Persist a run, including a copy of each artifact file
    fn record(&self, run: &TrainingRun) -> Result<(), TrackingError>;
}

/// Directory-backed run store
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
    experiment: String,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
        }
    }

    /// Directory holding one run
    pub fn run_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(&self.experiment).join(id.to_string())
    }

    /// Read back a recorded run
    pub fn load(&self, id: Uuid) -> Result<TrainingRun, TrackingError> {
        let path = self.run_dir(id).join("run.json");
        let bytes = std::fs::read(&path).map_err(io_error(&path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ExperimentTracker for FileTracker {
    fn record(&self, run: &TrainingRun) -> Result<(), TrackingError> {
        let run_dir = self.run_dir(run.id);
        let artifact_dir = run_dir.join("artifacts");
        std::fs::create_dir_all(&artifact_dir).map_err(io_error(&artifact_dir))?;

        let mut stored = run.clone();
        stored.artifacts.clear();
        for artifact in &run.artifacts {
            let Some(name) = artifact.file_name() else {
                continue;
            };
            let target = artifact_dir.join(name);
            std::fs::copy(artifact, &target).map_err(io_error(artifact))?;
            stored.artifacts.push(PathBuf::from("artifacts").join(name));
        }

        let path = run_dir.join("run.json");
        let json = serde_json::to_vec_pretty(&stored)?;
        std::fs::write(&path, json).map_err(io_error(&path))?;

        debug!(run_id = %run.id, dir = %run_dir.display(), "Recorded training run");
        Ok(())
    }
}

/// A run held by [`MemoryTracker`], with artifact contents by file name
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub run: TrainingRun,
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

/// In-process run store
#[derive(Debug, Default)]
pub struct MemoryTracker {
    runs: Mutex<Vec<RecordedRun>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded run
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ExperimentTracker for MemoryTracker {
    fn record(&self, run: &TrainingRun) -> Result<(), TrackingError> {
        let mut artifacts = BTreeMap::new();
        for artifact in &run.artifacts {
            let bytes = std::fs::read(artifact).map_err(io_error(artifact))?;
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            artifacts.insert(name, bytes);
        }

        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedRun {
                run: run.clone(),
                artifacts,
            });
        Ok(())
    }
}

/// Shared trackers record through the inner tracker
impl<T: ExperimentTracker + ?Sized> ExperimentTracker for std::sync::Arc<T> {
    fn record(&self, run: &TrainingRun) -> Result<(), TrackingError> {
        (**self).record(run)
    }
}
