//! Random forest classifier
//!
//! Gini-split decision trees grown to purity on bootstrap samples, with a
//! random subset of √n features considered at each split. Predictions
//! average the class distributions of the leaves reached in every tree.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{ModelError, Result};

/// Forest hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Seed for bootstrap and feature sampling
    pub random_state: u64,
    /// Maximum tree depth; unlimited when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            random_state: 42,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

impl ForestParams {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            random_state,
            ..Default::default()
        }
    }
}

// ============================================================================
// Decision Tree
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Class probabilities
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// A single classification tree stored as a node arena; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f32>],
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

impl TreeBuilder<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize], total: usize) -> usize {
        let distribution = counts
            .iter()
            .map(|&c| c as f64 / total.max(1) as f64)
            .collect();
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(&samples);
        let total = samples.len();
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);

        if pure || depth_reached || total < self.params.min_samples_split.max(2) {
            return self.leaf(&counts, total);
        }

        let Some((feature, threshold)) = self.best_split(&samples, &counts, rng) else {
            return self.leaf(&counts, total);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[s][feature] <= threshold);

        // Reserve the split slot so children get higher indices
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        let left = self.build(left, depth + 1, rng);
        let right = self.build(right, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    /// Lowest weighted Gini split over up to `max_features` informative features
    fn best_split(
        &self,
        samples: &[usize],
        parent_counts: &[usize],
        rng: &mut StdRng,
    ) -> Option<(usize, f32)> {
        let n_features = self.x.first().map(Vec::len).unwrap_or(0);
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let total = samples.len();
        let mut best: Option<(f64, usize, f32)> = None;
        let mut evaluated = 0usize;

        for feature in features {
            if evaluated >= self.max_features && best.is_some() {
                break;
            }

            let mut values: Vec<(f32, usize)> = samples
                .iter()
                .map(|&s| (self.x[s][feature], self.y[s]))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            if values[0].0 == values[total - 1].0 {
                // Constant within this node
                continue;
            }
            evaluated += 1;

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = parent_counts.to_vec();

            for i in 0..total - 1 {
                let (value, class) = values[i];
                left_counts[class] += 1;
                right_counts[class] -= 1;

                let next = values[i + 1].0;
                if value == next {
                    continue;
                }

                let n_left = i + 1;
                let n_right = total - n_left;
                let impurity = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / total as f64;

                if best.map_or(true, |(b, _, _)| impurity < b) {
                    best = Some((impurity, feature, value + (next - value) / 2.0));
                }
            }
        }

        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

impl DecisionTree {
    fn fit(
        x: &[Vec<f32>],
        y: &[usize],
        samples: Vec<usize>,
        n_classes: usize,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let max_features = ((n_features as f64).sqrt() as usize).max(1);

        let mut builder = TreeBuilder {
            x,
            y,
            n_classes,
            max_features,
            params,
            nodes: Vec::new(),
        };
        builder.build(samples, 0, rng);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Class distribution of the leaf reached by `row`
    fn distribution(&self, row: &[f32]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Children always sit after their parent, which also rules out cycles
    fn check(&self, n_classes: usize, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidModel("tree has no nodes".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } if distribution.len() != n_classes => {
                    return Err(ModelError::InvalidModel(format!(
                        "leaf {index} covers {} classes, expected {n_classes}",
                        distribution.len()
                    )));
                }
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(ModelError::InvalidModel(format!(
                            "node {index} splits on feature {feature} of {n_features}"
                        )));
                    }
                    let in_range = |child: usize| child > index && child < self.nodes.len();
                    if !in_range(*left) || !in_range(*right) {
                        return Err(ModelError::InvalidModel(format!(
                            "node {index} has children {left} and {right} out of range"
                        )));
                    }
                }
                Node::Leaf { .. } => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Random Forest
// ============================================================================

/// Bagged ensemble of decision trees over encoded class indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on a dense feature matrix and class indices in `0..n_classes`
    pub fn fit(x: &[Vec<f32>], y: &[usize], n_classes: usize, params: ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::ShapeMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        if params.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be positive".to_string(),
            ));
        }
        if let Some(&label) = y.iter().find(|&&label| label >= n_classes) {
            return Err(ModelError::InvalidParameter(format!(
                "class index {label} out of range for {n_classes} classes"
            )));
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let mut rng = StdRng::seed_from_u64(params.random_state);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let bootstrap: Vec<usize> = (0..n_samples)
                    .map(|_| tree_rng.gen_range(0..n_samples))
                    .collect();
                DecisionTree::fit(x, y, bootstrap, n_classes, &params, &mut tree_rng)
            })
            .collect();

        Ok(Self {
            params,
            n_classes,
            n_features,
            trees,
        })
    }

    /// Mean class distribution across trees
    pub fn predict_proba(&self, x: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        x.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(ModelError::ShapeMismatch {
                        expected: self.n_features,
                        actual: row.len(),
                    });
                }
                let mut proba = vec![0.0f64; self.n_classes];
                for tree in &self.trees {
                    for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                        *p += d;
                    }
                }
                let n_trees = self.trees.len() as f64;
                proba.iter_mut().for_each(|p| *p /= n_trees);
                Ok(proba)
            })
            .collect()
    }

    /// Most probable class index per row; ties go to the lowest index
    pub fn predict(&self, x: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|proba| {
                proba
                    .iter()
                    .enumerate()
                    .fold((0usize, f64::MIN), |(best, best_p), (i, &p)| {
                        if p > best_p {
                            (i, p)
                        } else {
                            (best, best_p)
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Structural consistency of a deserialized forest
    pub(crate) fn check(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ModelError::InvalidModel("forest has no trees".to_string()));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.check(self.n_classes, self.n_features))
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<Vec<f32>>, Vec<usize>) {
        let x = vec![
            vec![3.0, 0.0, 1.0],
            vec![2.0, 0.0, 0.0],
            vec![4.0, 1.0, 0.0],
            vec![0.0, 3.0, 1.0],
            vec![0.0, 2.0, 0.0],
            vec![1.0, 4.0, 0.0],
        ];
        let y = vec![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert!((gini(&[2, 2], 4) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_forest_separates_classes() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(&x, &y, 2, ForestParams::new(25, 42)).unwrap();
        assert_eq!(forest.n_trees(), 25);

        let predictions = forest.predict(&[vec![5.0, 0.0, 0.0], vec![0.0, 5.0, 0.0]]).unwrap();
        assert_eq!(predictions, vec![0, 1]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(&x, &y, 2, ForestParams::new(10, 7)).unwrap();
        for proba in forest.predict_proba(&x).unwrap() {
            assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = toy_data();
        let a = RandomForest::fit(&x, &y, 2, ForestParams::new(10, 42)).unwrap();
        let b = RandomForest::fit(&x, &y, 2, ForestParams::new(10, 42)).unwrap();
        assert_eq!(
            a.predict_proba(&[vec![1.0, 1.0, 1.0]]).unwrap(),
            b.predict_proba(&[vec![1.0, 1.0, 1.0]]).unwrap()
        );
    }

    #[test]
    fn test_single_class() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let forest = RandomForest::fit(&x, &[0, 0, 0], 1, ForestParams::new(5, 1)).unwrap();
        assert_eq!(forest.predict(&[vec![9.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn test_fit_errors() {
        assert!(matches!(
            RandomForest::fit(&[], &[], 2, ForestParams::default()),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(matches!(
            RandomForest::fit(&[vec![1.0]], &[0, 1], 2, ForestParams::default()),
            Err(ModelError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            RandomForest::fit(&[vec![1.0]], &[3], 2, ForestParams::default()),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fitted_forest_passes_check() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(&x, &y, 2, ForestParams::new(5, 42)).unwrap();
        assert!(forest.check().is_ok());
    }

    #[test]
    fn test_check_rejects_backward_child() {
        let tree = DecisionTree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 1,
                },
                Node::Leaf {
                    distribution: vec![1.0],
                },
            ],
        };
        assert!(matches!(tree.check(1, 1), Err(ModelError::InvalidModel(_))));
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(&x, &y, 2, ForestParams::new(3, 42)).unwrap();
        assert!(matches!(
            forest.predict(&[vec![1.0]]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
