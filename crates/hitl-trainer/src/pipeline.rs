//! Retraining pipeline
//!
//! Runs to completion in the calling task. Every early exit is a status,
//! unexpected failures become [`TrainingStatus::Error`], and the previous
//! model file is only replaced once a new model has been fitted.

use std::path::{Path, PathBuf};

use hitl_core::{
    AppConfig, CorrectionRepository, CorrectionRow, ModelConfig, SqliteStore, StorageConfig,
    TrainingConfig,
};
use hitl_model::{ForestParams, TextClassifier};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::selection::{
    cross_val_score, mean, shuffled_split, stratified_split, KFold, StratifiedKFold,
};
use crate::tracking::{ExperimentTracker, FileTracker, TrainingRun};
use crate::{Result, SplitStrategy, TrainingError, TrainingReport};

const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.png";

fn pick<'a>(items: &[&'a str], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| items[i]).collect()
}

/// Corrections in, role classifier out
pub struct TrainingPipeline {
    model: ModelConfig,
    training: TrainingConfig,
    experiment: String,
    scratch_dir: PathBuf,
    tracker: Option<Box<dyn ExperimentTracker>>,
}

impl TrainingPipeline {
    /// Pipeline with a file tracker when tracking is enabled
    pub fn new(config: &AppConfig) -> Self {
        let tracker = config.tracking.enabled.then(|| {
            Box::new(FileTracker::new(
                config.tracking.dir.clone(),
                config.tracking.experiment.clone(),
            )) as Box<dyn ExperimentTracker>
        });

        Self {
            model: config.model.clone(),
            training: config.training.clone(),
            experiment: config.tracking.experiment.clone(),
            scratch_dir: config.tracking.scratch_dir.clone(),
            tracker,
        }
    }

    /// Replace the tracker
    pub fn with_tracker<T: ExperimentTracker + 'static>(mut self, tracker: T) -> Self {
        self.tracker = Some(Box::new(tracker));
        self
    }

    /// Disable run tracking
    pub fn without_tracking(mut self) -> Self {
        self.tracker = None;
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model.path
    }

    /// Train from an existing database; a missing database is `no_data`
    pub async fn run_with_storage(&self, storage: &StorageConfig) -> TrainingReport {
        match SqliteStore::open_existing(storage).await {
            Ok(Some(store)) => self.run(&store).await,
            Ok(None) => {
                info!(url = %storage.database_url, "No database yet; nothing to train on");
                TrainingReport::no_data("database does not exist")
            }
            Err(e) => {
                error!(error = %e, "Failed to open database for training");
                TrainingReport::error(e.to_string())
            }
        }
    }

    /// Train on every correction in the repository
    pub async fn run(&self, repository: &dyn CorrectionRepository) -> TrainingReport {
        match repository.load_corrections().await {
            Ok(Some(rows)) => self.train(&rows),
            Ok(None) => {
                info!("Corrections table does not exist; nothing to train on");
                TrainingReport::no_data("no corrections table")
            }
            Err(e) => {
                error!(error = %e, "Failed to load corrections");
                TrainingReport::error(TrainingError::from(e).to_string())
            }
        }
    }

    /// Train on already loaded correction rows
    pub fn train(&self, rows: &[CorrectionRow]) -> TrainingReport {
        match self.try_train(rows) {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Training failed");
                TrainingReport::error(e.to_string())
            }
        }
    }

    fn try_train(&self, rows: &[CorrectionRow]) -> Result<TrainingReport> {
        if rows.is_empty() {
            info!("No corrections recorded yet");
            return Ok(TrainingReport::no_data("no corrections recorded"));
        }

        let dataset = Dataset::from_rows(rows);
        if dataset.len() < self.training.min_examples {
            info!(
                examples = dataset.len(),
                required = self.training.min_examples,
                "Not enough labelled corrections to train"
            );
            return Ok(TrainingReport::insufficient_data(
                dataset.len(),
                format!(
                    "need at least {} labelled corrections, found {}",
                    self.training.min_examples,
                    dataset.len()
                ),
            ));
        }

        let texts = dataset.texts();
        let labels = dataset.labels();
        let (classes, encoded) = dataset.encode_labels();
        let strategy = SplitStrategy::for_min_class(
            dataset.min_class_count().unwrap_or(0),
            self.training.max_cv_folds,
        );
        let seed = self.model.random_state;
        let test_size = self.training.test_size;

        info!(
            examples = dataset.len(),
            classes = classes.len(),
            split = strategy.name(),
            folds = strategy.folds(),
            "Starting training"
        );

        let split = match strategy {
            SplitStrategy::Stratified { .. } => stratified_split(&encoded, test_size, seed)?,
            SplitStrategy::Shuffled { .. } => shuffled_split(texts.len(), test_size, seed)?,
        };

        let params = ForestParams::new(self.model.n_estimators, seed);
        let cv_accuracy = self.cross_validate(&texts, &labels, &encoded, strategy, &params);

        let model = TextClassifier::fit(
            &pick(&texts, &split.train),
            &pick(&labels, &split.train),
            params,
        )?;

        let mut run = TrainingRun::new(&self.experiment);
        run.log_param("dataset_size", dataset.len());
        run.log_param("n_estimators", self.model.n_estimators);
        run.log_param("random_state", seed);
        run.log_param("test_size", test_size);
        run.log_param("split_strategy", strategy.name());
        run.log_param("cv_folds", strategy.folds());
        run.log_param("classes", classes.join(", "));
        if let Some(avg) = dataset.avg_human_time() {
            run.log_metric("avg_human_time_sec", avg);
        }
        run.log_metric("dataset_size", dataset.len() as f64);
        run.log_metric("cv_accuracy_mean", cv_accuracy);

        let scratch = self.scratch_dir.join(format!("hitl-run-{}", run.id));
        let evaluated = self.evaluate(&model, &texts, &labels, &split.test, &scratch, &mut run);

        let saved = evaluated.and_then(|()| Ok(model.save(&self.model.path)?));
        run.finish();
        let run_id = self.record(&run);
        remove_scratch(&scratch);
        saved?;

        info!(
            path = %self.model.path.display(),
            cv_accuracy,
            "Saved retrained model"
        );
        Ok(TrainingReport::success(
            cv_accuracy,
            dataset.len(),
            strategy,
            run_id,
        ))
    }

    /// Mean fold accuracy over the whole dataset; 0.0 when CV cannot run
    fn cross_validate(
        &self,
        texts: &[&str],
        labels: &[&str],
        encoded: &[usize],
        strategy: SplitStrategy,
        params: &ForestParams,
    ) -> f64 {
        let folds = match strategy {
            SplitStrategy::Stratified { folds } => StratifiedKFold::new(folds).split(encoded),
            SplitStrategy::Shuffled { folds } => KFold::new(folds).split(texts.len()),
        };

        let scores = folds.and_then(|folds| Ok(cross_val_score(texts, labels, &folds, params)?));
        match scores {
            Ok(scores) => {
                debug!(?scores, "Cross-validation scores");
                mean(&scores)
            }
            Err(e) => {
                warn!(error = %e, "Cross-validation failed; scoring 0.0");
                0.0
            }
        }
    }

    /// Held-out metrics and the confusion matrix artifact
    fn evaluate(
        &self,
        model: &TextClassifier,
        texts: &[&str],
        labels: &[&str],
        test: &[usize],
        scratch: &Path,
        run: &mut TrainingRun,
    ) -> Result<()> {
        if test.is_empty() {
            debug!("Empty test split; skipping held-out evaluation");
            return Ok(());
        }

        let truth = pick(labels, test);
        let predicted = model.predict(&pick(texts, test))?;

        let report = ClassificationReport::from_predictions(&truth, &predicted);
        run.log_metric("test_precision", report.weighted_precision());
        run.log_metric("test_recall", report.weighted_recall());
        run.log_metric("test_f1_score", report.weighted_f1());

        let path = scratch.join(CONFUSION_MATRIX_FILE);
        match ConfusionMatrix::from_predictions(&truth, &predicted)
            .and_then(|matrix| matrix.render_png(&path))
        {
            Ok(()) => run.log_artifact(path),
            Err(e) => warn!(error = %e, "Skipping confusion matrix"),
        }
        Ok(())
    }

    fn record(&self, run: &TrainingRun) -> Option<Uuid> {
        let tracker = self.tracker.as_ref()?;
        match tracker.record(run) {
            Ok(()) => {
                info!(run_id = %run.id, "Recorded training run");
                Some(run.id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to record training run");
                None
            }
        }
    }
}

fn remove_scratch(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to remove local artifacts");
    }
}
