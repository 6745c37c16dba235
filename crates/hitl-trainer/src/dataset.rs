//! Training dataset built from stored corrections

use std::collections::BTreeMap;

use hitl_core::{CorrectionRow, ExtractedRecord};
use tracing::warn;

/// One labelled classifier input
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub text: String,
    pub label: String,
}

impl TrainingExample {
    /// Example from a corrected record; `None` when the role is unknown
    pub fn from_record(record: &ExtractedRecord) -> Option<Self> {
        record.has_known_role().then(|| Self {
            text: record.training_text(),
            label: record.predicted_role.trim().to_string(),
        })
    }
}

/// Usable examples plus statistics over every correction row
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<TrainingExample>,
    total_rows: usize,
    skipped_rows: usize,
    avg_human_time: Option<f64>,
}

impl Dataset {
    /// Build a dataset from raw rows.
    ///
    /// Rows whose payload is missing or does not decode are skipped. The
    /// mean correction time covers every row with a time, labelled or not.
    pub fn from_rows(rows: &[CorrectionRow]) -> Self {
        let mut examples = Vec::new();
        let mut skipped_rows = 0;

        for (index, row) in rows.iter().enumerate() {
            let Some(data) = row.corrected_data.as_deref() else {
                warn!(row = index, "Correction row has no data; skipping");
                skipped_rows += 1;
                continue;
            };

            match ExtractedRecord::from_json_str(data) {
                Ok(record) => examples.extend(TrainingExample::from_record(&record)),
                Err(e) => {
                    warn!(row = index, error = %e, "Undecodable correction; skipping");
                    skipped_rows += 1;
                }
            }
        }

        let times: Vec<i64> = rows.iter().filter_map(|row| row.time_taken).collect();
        let avg_human_time = (!times.is_empty())
            .then(|| times.iter().map(|&t| t as f64).sum::<f64>() / times.len() as f64);

        Self {
            examples,
            total_rows: rows.len(),
            skipped_rows,
            avg_human_time,
        }
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    /// Number of usable examples
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Mean human correction time in seconds
    pub fn avg_human_time(&self) -> Option<f64> {
        self.avg_human_time
    }

    pub fn texts(&self) -> Vec<&str> {
        self.examples.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.examples.iter().map(|e| e.label.as_str()).collect()
    }

    /// Example count per label, labels sorted
    pub fn class_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for example in &self.examples {
            *counts.entry(example.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Size of the rarest class
    pub fn min_class_count(&self) -> Option<usize> {
        self.class_counts().values().copied().min()
    }

    /// Sorted distinct labels and each example's index into them
    pub fn encode_labels(&self) -> (Vec<String>, Vec<usize>) {
        let classes: Vec<String> = self
            .class_counts()
            .keys()
            .map(|label| label.to_string())
            .collect();
        let encoded = self
            .examples
            .iter()
            .map(|e| classes.binary_search(&e.label).unwrap_or_default())
            .collect();
        (classes, encoded)
    }
}
