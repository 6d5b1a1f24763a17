//! Isolation forest outlier detector.
//!
//! Points that are isolated by few random axis-aligned splits are anomalous.
//! `decision_function` follows the usual convention: positive means more
//! typical than the automatic contamination offset, negative means less, and
//! higher is always more normal. Measures are relative to the fit population.

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

use crate::error::ScoringError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Offset used by automatic contamination: an average path equal to the
/// expected unsuccessful-search length scores exactly 0.
const AUTO_CONTAMINATION_OFFSET: f64 = -0.5;

const DEFAULT_MAX_SAMPLES: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    /// Subsample size per tree. `None` means `min(256, n_samples)`.
    pub max_samples: Option<usize>,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build<R: AsRef<[f64]>>(
        data: &[R],
        sample: Vec<usize>,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = data.first().map_or(0, |row| row.as_ref().len());
        let mut tree = Self { nodes: Vec::new() };
        let mut features: Vec<usize> = (0..n_features).collect();
        tree.grow(data, sample, 0, max_depth, &mut features, rng);
        tree
    }

    /// Grow the subtree for `sample`, returning its node index.
    fn grow<R: AsRef<[f64]>>(
        &mut self,
        data: &[R],
        sample: Vec<usize>,
        depth: usize,
        max_depth: usize,
        features: &mut [usize],
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: sample.len() });

        if sample.len() <= 1 || depth >= max_depth {
            return id;
        }

        // Visit features in random order and split on the first non-constant one.
        features.shuffle(rng);
        let mut chosen = None;
        for &feature in features.iter() {
            let (lo, hi) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = data[i].as_ref()[feature];
                (lo.min(v), hi.max(v))
            });
            if hi > lo {
                chosen = Some((feature, lo, hi));
                break;
            }
        }
        let Some((feature, lo, hi)) = chosen else {
            return id;
        };

        let mut threshold = lo + rng.gen::<f64>() * (hi - lo);
        if threshold.is_nan() || threshold >= hi {
            threshold = lo;
        }

        let (left_sample, right_sample): (Vec<usize>, Vec<usize>) =
            sample.into_iter().partition(|&i| data[i].as_ref()[feature] <= threshold);

        let left = self.grow(data, left_sample, depth + 1, max_depth, features, rng);
        let right = self.grow(data, right_sample, depth + 1, max_depth, features, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `point` lands, plus the expected remaining depth of its leaf.
    fn path_length(&self, point: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average unsuccessful-search path length in a binary search tree of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted forest. Immutable once built.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    max_samples: usize,
    n_features: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit on the full matrix in one pass. Rows must share one width.
    pub fn fit<R: AsRef<[f64]>>(
        config: &IsolationForestConfig,
        data: &[R],
    ) -> Result<Self, ScoringError> {
        if data.is_empty() {
            return Err(ScoringError::EmptyBatch);
        }
        if config.n_estimators == 0 {
            return Err(ScoringError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if config.max_samples == Some(0) {
            return Err(ScoringError::InvalidConfig(
                "max_samples must be at least 1".to_string(),
            ));
        }

        let n_samples = data.len();
        let n_features = data[0].as_ref().len();
        if let Some((row, got)) = data
            .iter()
            .map(|r| r.as_ref().len())
            .enumerate()
            .find(|(_, len)| *len != n_features)
        {
            return Err(ScoringError::RaggedRow {
                row,
                expected: n_features,
                got,
            });
        }

        let max_samples = config
            .max_samples
            .unwrap_or(DEFAULT_MAX_SAMPLES)
            .min(n_samples);
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let trees = (0..config.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let sample = index::sample(&mut tree_rng, n_samples, max_samples).into_vec();
                IsolationTree::build(data, sample, max_depth, &mut tree_rng)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            trees = trees.len(),
            max_samples,
            max_depth,
            n_features,
            "Isolation forest fitted"
        );

        Ok(Self {
            trees,
            max_samples,
            n_features,
            offset: AUTO_CONTAMINATION_OFFSET,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Raw isolation score in `[-1, 0)`. Lower is more anomalous.
    pub fn score_samples<R: AsRef<[f64]>>(&self, data: &[R]) -> Vec<f64> {
        let norm = average_path_length(self.max_samples);
        data.iter()
            .map(|point| {
                let point = point.as_ref();
                let mean_depth = self.trees.iter().map(|t| t.path_length(point)).sum::<f64>()
                    / self.trees.len() as f64;
                // A one-sample forest has no expected depth to normalize by.
                let normalized = if norm > 0.0 { mean_depth / norm } else { 0.0 };
                -(2f64.powf(-normalized))
            })
            .collect()
    }

    /// Anomaly measure: higher means more normal.
    pub fn decision_function<R: AsRef<[f64]>>(&self, data: &[R]) -> Vec<f64> {
        self.score_samples(data)
            .into_iter()
            .map(|s| s - self.offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let x = (i % 6) as f64 * 0.1;
                let y = (i / 6) as f64 * 0.1;
                vec![x, y, 1.0]
            })
            .collect();
        data.push(vec![100.0, 100.0, 1.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244_770_920_119_917).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&IsolationForestConfig::default(), &data).unwrap();
        let scores = forest.decision_function(&data);

        let outlier = scores[30];
        assert!(scores[..30].iter().all(|s| *s > outlier));
        assert!(outlier < 0.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&IsolationForestConfig::default(), &data).unwrap();
        for s in forest.score_samples(&data) {
            assert!((-1.0..0.0).contains(&s));
        }
    }

    #[test]
    fn test_same_seed_same_scores() {
        let data = cluster_with_outlier();
        let config = IsolationForestConfig {
            seed: 7,
            ..Default::default()
        };
        let a = IsolationForest::fit(&config, &data).unwrap().decision_function(&data);
        let b = IsolationForest::fit(&config, &data).unwrap().decision_function(&data);
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_samples_capped_by_population() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&IsolationForestConfig::default(), &data).unwrap();
        assert_eq!(forest.max_samples(), data.len());
        assert_eq!(forest.n_features(), 3);

        let config = IsolationForestConfig {
            max_samples: Some(8),
            ..Default::default()
        };
        assert_eq!(IsolationForest::fit(&config, &data).unwrap().max_samples(), 8);
    }

    #[test]
    fn test_constant_data_is_uniform() {
        let data = vec![vec![1.0, 2.0]; 10];
        let forest = IsolationForest::fit(&IsolationForestConfig::default(), &data).unwrap();
        let scores = forest.decision_function(&data);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_single_sample() {
        let forest =
            IsolationForest::fit(&IsolationForestConfig::default(), &[vec![3.0, 4.0]]).unwrap();
        assert_eq!(forest.decision_function(&[vec![3.0, 4.0]]), vec![-0.5]);
    }

    #[test]
    fn test_rejects_empty_and_bad_config() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert_eq!(
            IsolationForest::fit(&IsolationForestConfig::default(), &empty).unwrap_err(),
            ScoringError::EmptyBatch
        );

        let config = IsolationForestConfig {
            n_estimators: 0,
            ..Default::default()
        };
        assert!(matches!(
            IsolationForest::fit(&config, &[vec![1.0]]),
            Err(ScoringError::InvalidConfig(_))
        ));

        let ragged = vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0]];
        assert_eq!(
            IsolationForest::fit(&IsolationForestConfig::default(), &ragged).unwrap_err(),
            ScoringError::RaggedRow {
                row: 2,
                expected: 2,
                got: 1,
            }
        );
    }
}
