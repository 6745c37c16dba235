//! Classification metrics
//!
//! Per-class precision, recall and F1 with support-weighted averages, plus a
//! confusion matrix that can be rendered as a PNG heatmap.

use std::collections::BTreeSet;
use std::path::Path;

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainingError};

// ============================================================================
// Class Metrics
// ============================================================================

/// Counts for one label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    /// Predicted as this label and truly this label
    pub true_positives: usize,
    /// Predicted as this label, truly another
    pub false_positives: usize,
    /// Truly this label, predicted as another
    pub false_negatives: usize,
}

impl ClassMetrics {
    /// Number of true samples of this label
    pub fn support(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    /// TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        if self.true_positives + self.false_positives == 0 {
            0.0
        } else {
            self.true_positives as f64 / (self.true_positives + self.false_positives) as f64
        }
    }

    /// TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        if self.support() == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.support() as f64
        }
    }

    /// 2PR / (P + R)
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

/// Sorted union of the labels seen in truth and predictions
fn label_union<T: AsRef<str>, P: AsRef<str>>(truth: &[T], predicted: &[P]) -> Vec<String> {
    truth
        .iter()
        .map(|t| t.as_ref())
        .chain(predicted.iter().map(|p| p.as_ref()))
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Classification Report
// ============================================================================

/// Per-class metrics over a set of predictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
}

impl ClassificationReport {
    pub fn from_predictions<T: AsRef<str>, P: AsRef<str>>(truth: &[T], predicted: &[P]) -> Self {
        let mut classes: Vec<ClassMetrics> = label_union(truth, predicted)
            .into_iter()
            .map(|label| ClassMetrics {
                label,
                ..Default::default()
            })
            .collect();

        let index = |label: &str| classes.binary_search_by(|c| c.label.as_str().cmp(label));
        let pairs: Vec<(usize, usize)> = truth
            .iter()
            .zip(predicted)
            .filter_map(|(t, p)| Some((index(t.as_ref()).ok()?, index(p.as_ref()).ok()?)))
            .collect();

        for (t, p) in pairs {
            if t == p {
                classes[t].true_positives += 1;
            } else {
                classes[t].false_negatives += 1;
                classes[p].false_positives += 1;
            }
        }

        Self { classes }
    }

    fn weighted(&self, metric: impl Fn(&ClassMetrics) -> f64) -> f64 {
        let total: usize = self.classes.iter().map(ClassMetrics::support).sum();
        if total == 0 {
            return 0.0;
        }
        self.classes
            .iter()
            .map(|c| metric(c) * c.support() as f64)
            .sum::<f64>()
            / total as f64
    }

    /// Support-weighted precision
    pub fn weighted_precision(&self) -> f64 {
        self.weighted(ClassMetrics::precision)
    }

    /// Support-weighted recall
    pub fn weighted_recall(&self) -> f64 {
        self.weighted(ClassMetrics::recall)
    }

    /// Support-weighted F1
    pub fn weighted_f1(&self) -> f64 {
        self.weighted(ClassMetrics::f1_score)
    }
}

// ============================================================================
// Confusion Matrix
// ============================================================================

const CELL_SIZE: u32 = 48;
const GRID: Rgb<u8> = Rgb([255, 255, 255]);

/// Rows are true labels, columns predicted labels, both sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build a matrix; needs at least two distinct labels
    pub fn from_predictions<T: AsRef<str>, P: AsRef<str>>(
        truth: &[T],
        predicted: &[P],
    ) -> Result<Self> {
        let labels = label_union(truth, predicted);
        if labels.len() < 2 {
            return Err(TrainingError::ConfusionMatrix(format!(
                "need at least two classes, found {}",
                labels.len()
            )));
        }

        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            let row = labels.binary_search_by(|l| l.as_str().cmp(t.as_ref()));
            let col = labels.binary_search_by(|l| l.as_str().cmp(p.as_ref()));
            if let (Ok(row), Ok(col)) = (row, col) {
                counts[row][col] += 1;
            }
        }

        Ok(Self { labels, counts })
    }

    /// Largest cell count
    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Heatmap image; darker cells hold more samples
    pub fn to_image(&self) -> RgbImage {
        let n = self.labels.len() as u32;
        let max = self.max_count().max(1) as f64;

        RgbImage::from_fn(n * CELL_SIZE, n * CELL_SIZE, |x, y| {
            if x % CELL_SIZE == 0 || y % CELL_SIZE == 0 {
                return GRID;
            }
            let count = self.counts[(y / CELL_SIZE) as usize][(x / CELL_SIZE) as usize];
            let intensity = count as f64 / max;
            // white to dark blue
            let fade = |full: f64, dark: f64| (full - (full - dark) * intensity).round() as u8;
            Rgb([fade(247.0, 8.0), fade(251.0, 48.0), fade(255.0, 107.0)])
        })
    }

    /// Write the heatmap as a PNG file
    pub fn render_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TrainingError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| TrainingError::Render(e.to_string()))
    }
}
