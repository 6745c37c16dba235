//! Data splitting and cross-validation
//!
//! Held-out splits are seeded and reproducible. K-fold splitters do not
//! shuffle: plain folds are contiguous, stratified folds spread each class
//! over the folds in order of appearance.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use hitl_model::{ForestParams, ModelError, TextClassifier};

use crate::{Result, TrainingError};

/// Train and test indices into the dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of test samples for a shuffled split
fn test_count(n_samples: usize, test_size: f64) -> usize {
    // Tolerance keeps 0.3 * 10 at 3 instead of 4
    ((test_size * n_samples as f64) - 1e-9).ceil().max(0.0) as usize
}

fn check_test_size(test_size: f64) -> Result<()> {
    if test_size > 0.0 && test_size < 1.0 {
        Ok(())
    } else {
        Err(TrainingError::InvalidSplit(format!(
            "test_size must be in (0, 1), got {test_size}"
        )))
    }
}

/// Random train/test split ignoring labels
pub fn shuffled_split(n_samples: usize, test_size: f64, seed: u64) -> Result<Split> {
    check_test_size(test_size)?;

    let n_test = test_count(n_samples, test_size);
    if n_test == 0 || n_test >= n_samples {
        return Err(TrainingError::InvalidSplit(format!(
            "cannot hold out {n_test} of {n_samples} samples"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng);

    let mut test = indices[..n_test].to_vec();
    let mut train = indices[n_test..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Ok(Split { train, test })
}

/// Random train/test split keeping every class on both sides.
///
/// Each class holds out `round(count * test_size)` samples, at least one
/// and never all of them, so every class needs two or more samples.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> Result<Split> {
    check_test_size(test_size)?;

    let n_classes = labels.iter().max().map_or(0, |&max| max + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (index, &label) in labels.iter().enumerate() {
        by_class[label].push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for members in by_class.iter_mut().filter(|m| !m.is_empty()) {
        let count = members.len();
        if count < 2 {
            return Err(TrainingError::InvalidSplit(
                "stratified split needs at least two samples per class".to_string(),
            ));
        }

        let n_test = ((count as f64 * test_size).round() as usize).clamp(1, count - 1);
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    test.sort_unstable();
    train.sort_unstable();
    Ok(Split { train, test })
}

// ============================================================================
// K-Fold
// ============================================================================

/// Contiguous, unshuffled k-fold
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Split>> {
        check_folds(self.n_splits, n_samples)?;

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut start = 0;

        Ok((0..self.n_splits)
            .map(|fold| {
                let size = base + usize::from(fold < extra);
                let test: Vec<usize> = (start..start + size).collect();
                let train = (0..start).chain(start + size..n_samples).collect();
                start += size;
                Split { train, test }
            })
            .collect())
    }
}

/// Unshuffled k-fold preserving class proportions
#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Classes are numbered by first appearance; the sorted label sequence
    /// is dealt round-robin to decide how many samples of each class every
    /// fold tests, then each class fills its folds in sample order.
    pub fn split(&self, labels: &[usize]) -> Result<Vec<Split>> {
        let k = self.n_splits;
        check_folds(k, labels.len())?;

        let mut first_seen: Vec<usize> = Vec::new();
        let encoded: Vec<usize> = labels
            .iter()
            .map(|label| match first_seen.iter().position(|l| l == label) {
                Some(position) => position,
                None => {
                    first_seen.push(*label);
                    first_seen.len() - 1
                }
            })
            .collect();
        let n_classes = first_seen.len();

        let mut class_counts = vec![0usize; n_classes];
        for &class in &encoded {
            class_counts[class] += 1;
        }
        if class_counts.iter().all(|&count| count < k) {
            return Err(TrainingError::InvalidSplit(format!(
                "n_splits={k} is greater than the number of members in each class"
            )));
        }

        let mut order = encoded.clone();
        order.sort_unstable();

        // allocation[fold][class]
        let mut allocation = vec![vec![0usize; n_classes]; k];
        for (position, &class) in order.iter().enumerate() {
            allocation[position % k][class] += 1;
        }

        let mut test_fold = vec![0usize; labels.len()];
        for class in 0..n_classes {
            let mut folds = (0..k)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]));
            for (index, _) in encoded.iter().enumerate().filter(|(_, c)| **c == class) {
                test_fold[index] = folds.next().unwrap_or(k - 1);
            }
        }

        Ok((0..k)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&index| test_fold[index] == fold);
                Split { train, test }
            })
            .collect())
    }
}

fn check_folds(n_splits: usize, n_samples: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(TrainingError::InvalidSplit(format!(
            "need at least 2 folds, got {n_splits}"
        )));
    }
    if n_splits > n_samples {
        return Err(TrainingError::InvalidSplit(format!(
            "cannot make {n_splits} folds from {n_samples} samples"
        )));
    }
    Ok(())
}

// ============================================================================
// Cross-validation
// ============================================================================

fn select<'a, T: AsRef<str>>(items: &'a [T], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| items[i].as_ref()).collect()
}

/// Fraction of predictions equal to the truth
pub fn accuracy<T: AsRef<str>, P: AsRef<str>>(truth: &[T], predicted: &[P]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t.as_ref() == p.as_ref())
        .count();
    correct as f64 / truth.len() as f64
}

/// Accuracy of a freshly fitted classifier on each fold
pub fn cross_val_score<T, L>(
    texts: &[T],
    labels: &[L],
    folds: &[Split],
    params: &ForestParams,
) -> std::result::Result<Vec<f64>, ModelError>
where
    T: AsRef<str>,
    L: AsRef<str>,
{
    folds
        .iter()
        .map(|fold| {
            let model = TextClassifier::fit(
                &select(texts, &fold.train),
                &select(labels, &fold.train),
                params.clone(),
            )?;
            let predicted = model.predict(&select(texts, &fold.test))?;
            Ok(accuracy(&select(labels, &fold.test), &predicted))
        })
        .collect()
}

/// Mean of fold scores
pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffled_split_sizes() {
        let split = shuffled_split(10, 0.3, 42).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);

        let split = shuffled_split(3, 0.3, 42).unwrap();
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 2);
    }

    #[test]
    fn test_shuffled_split_is_seeded() {
        assert_eq!(
            shuffled_split(20, 0.3, 7).unwrap(),
            shuffled_split(20, 0.3, 7).unwrap()
        );
    }

    #[test]
    fn test_shuffled_split_covers_all_samples() {
        let split = shuffled_split(9, 0.3, 1).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffled_split_rejects_bad_sizes() {
        assert!(shuffled_split(1, 0.3, 42).is_err());
        assert!(shuffled_split(10, 1.5, 42).is_err());
        assert!(shuffled_split(10, 0.0, 42).is_err());
    }

    #[test]
    fn test_stratified_split_keeps_each_class_on_both_sides() {
        let labels = [0, 0, 1, 1];
        let split = stratified_split(&labels, 0.3, 42).unwrap();

        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 2);
        for side in [&split.train, &split.test] {
            let mut classes: Vec<usize> = side.iter().map(|&i| labels[i]).collect();
            classes.sort_unstable();
            assert_eq!(classes, vec![0, 1]);
        }
    }

    #[test]
    fn test_stratified_split_rejects_singleton_class() {
        assert!(stratified_split(&[0, 0, 1], 0.3, 42).is_err());
    }

    #[test]
    fn test_kfold_contiguous() {
        let folds = KFold::new(2).split(5).unwrap();
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[0].train, vec![3, 4]);
        assert_eq!(folds[1].test, vec![3, 4]);
        assert_eq!(folds[1].train, vec![0, 1, 2]);
    }

    #[test]
    fn test_kfold_too_many_folds() {
        assert!(KFold::new(4).split(3).is_err());
        assert!(KFold::new(1).split(3).is_err());
    }

    #[test]
    fn test_stratified_kfold_balances_classes() {
        let labels = [1, 1, 1, 0, 0, 0];
        let folds = StratifiedKFold::new(3).split(&labels).unwrap();

        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].test, vec![0, 3]);
        assert_eq!(folds[1].test, vec![1, 4]);
        assert_eq!(folds[2].test, vec![2, 5]);
    }

    #[test]
    fn test_stratified_kfold_uneven_classes() {
        // Sorted encoded order: 0 0 0 1 1 dealt over 2 folds
        let labels = [5, 5, 5, 9, 9];
        let folds = StratifiedKFold::new(2).split(&labels).unwrap();

        assert_eq!(folds[0].test, vec![0, 1, 3]);
        assert_eq!(folds[1].test, vec![2, 4]);
    }

    #[test]
    fn test_stratified_kfold_too_many_folds() {
        assert!(StratifiedKFold::new(3).split(&[0, 0, 1, 1]).is_err());
    }

    #[test]
    fn test_cross_val_score() {
        let texts = [
            "python sql",
            "python pandas",
            "python numpy",
            "marketing sales",
            "sales communication",
            "marketing communication",
        ];
        let labels = ["Data", "Data", "Data", "Sales", "Sales", "Sales"];
        let encoded = [0, 0, 0, 1, 1, 1];

        let folds = StratifiedKFold::new(3).split(&encoded).unwrap();
        let scores = cross_val_score(&texts, &labels, &folds, &ForestParams::new(10, 42)).unwrap();

        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_accuracy_and_mean() {
        assert_eq!(accuracy(&["a", "b", "a"], &["a", "a", "a"]), 2.0 / 3.0);
        assert_eq!(accuracy::<&str, &str>(&[], &[]), 0.0);
        assert_eq!(mean(&[0.5, 1.0]), 0.75);
        assert_eq!(mean(&[]), 0.0);
    }
}
