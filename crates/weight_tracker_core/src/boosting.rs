//! crates/weight_tracker_core/src/boosting.rs
//!
//! Feature standardization and gradient-boosted regression trees
//! (squared-error loss) used by the forecast engine.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Two sorted feature values closer than this are treated as equal.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Nodes whose residual sum of squares is at or below this are not split.
const IMPURITY_EPSILON: f64 = 1e-12;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Training set is empty")]
    EmptyTrainingSet,
    #[error("Row {row} has {found} features, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Training data contains a non-finite value")]
    NonFinite,
}

fn check_matrix(rows: &[Vec<f64>]) -> Result<usize, FitError> {
    let width = rows.first().ok_or(FitError::EmptyTrainingSet)?.len();
    for (row, values) in rows.iter().enumerate() {
        if values.len() != width {
            return Err(FitError::DimensionMismatch {
                row,
                expected: width,
                found: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }
    }
    Ok(width)
}

//=========================================================================================
// StandardScaler
//=========================================================================================

/// Per-feature zero-mean, unit-variance scaling.
///
/// Uses the population standard deviation; a constant feature keeps a scale of 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let width = check_matrix(rows)?;
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(row) {
                *scale += (value - mean).powi(2) / n;
            }
        }
        for scale in scales.iter_mut() {
            *scale = scale.sqrt();
            if *scale <= f64::EPSILON {
                *scale = 1.0;
            }
        }

        Ok(Self { means, scales })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

//=========================================================================================
// Regression Tree
//=========================================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let value = row.get(*feature).copied().unwrap_or(0.0);
                if value <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    improvement: f64,
}

/// Grows a depth-limited tree over `rows[indices]` against `targets`.
struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    max_depth: usize,
    min_samples_split: usize,
    width: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> Node {
        let n = indices.len();
        let mean = indices.iter().map(|&i| self.targets[i]).sum::<f64>() / n as f64;
        let impurity: f64 = indices
            .iter()
            .map(|&i| (self.targets[i] - mean).powi(2))
            .sum();

        if depth >= self.max_depth || n < self.min_samples_split || impurity <= IMPURITY_EPSILON {
            return Node::Leaf(mean);
        }

        let Some(split) = self.find_split(indices, rng) else {
            return Node::Leaf(mean);
        };

        indices.sort_by(|&a, &b| {
            let left_a = self.rows[a][split.feature] <= split.threshold;
            let left_b = self.rows[b][split.feature] <= split.threshold;
            left_b.cmp(&left_a)
        });
        let boundary = indices
            .iter()
            .take_while(|&&i| self.rows[i][split.feature] <= split.threshold)
            .count();
        let (left, right) = indices.split_at_mut(boundary);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(left, depth + 1, rng)),
            right: Box::new(self.build(right, depth + 1, rng)),
        }
    }

    fn find_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.width).collect();
        features.shuffle(rng);

        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in features {
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.targets[sorted[k - 1]];
                let lower = self.rows[sorted[k - 1]][feature];
                let upper = self.rows[sorted[k]][feature];
                if upper <= lower + FEATURE_THRESHOLD {
                    continue;
                }

                let n_left = k as f64;
                let n_right = (n - k) as f64;
                let diff = left_sum / n_left - (total - left_sum) / n_right;
                let improvement = n_left * n_right / n as f64 * diff * diff;

                if best.as_ref().map_or(true, |b| improvement > b.improvement) {
                    let mut threshold = (lower + upper) / 2.0;
                    if threshold >= upper {
                        threshold = lower;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        improvement,
                    });
                }
            }
        }

        best.filter(|b| b.improvement > 0.0)
    }
}

//=========================================================================================
// Gradient Boosting
//=========================================================================================

/// Hyper-parameters of [`GradientBoostedTrees`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Seeds the feature visiting order of the split search.
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// An additive ensemble of regression trees fit stage-wise on squared-error residuals.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    init: f64,
    learning_rate: f64,
    trees: Vec<Node>,
}

impl GradientBoostedTrees {
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: &BoostingParams) -> Result<Self, FitError> {
        let width = check_matrix(rows)?;
        if targets.len() != rows.len() {
            return Err(FitError::DimensionMismatch {
                row: rows.len().min(targets.len()),
                expected: rows.len(),
                found: targets.len(),
            });
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let init = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![init; targets.len()];
        let mut residuals = vec![0.0; targets.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut rng = StdRng::seed_from_u64(params.seed);

        for _ in 0..params.n_estimators {
            for ((residual, target), prediction) in residuals.iter_mut().zip(targets).zip(&predictions) {
                *residual = target - prediction;
            }

            let builder = TreeBuilder {
                rows,
                targets: &residuals,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split.max(2),
                width,
            };
            let mut indices: Vec<usize> = (0..rows.len()).collect();
            let tree = builder.build(&mut indices, 0, &mut rng);

            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            init,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.init, |acc, tree| acc + self.learning_rate * tree.predict(row))
    }
}
