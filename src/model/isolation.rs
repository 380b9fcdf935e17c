//! Isolation forest. Each tree isolates points by random axis-aligned splits on a
//! subsample; the average depth at which a point is isolated is its anomaly signal.
//!
//! Scores follow the usual convention: `-2^(-E[h(x)] / c(ψ))`, so lower means more
//! anomalous, and the outlier threshold is the `contamination` quantile of the
//! training scores.

use crate::error::ModelError;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    /// Expected outlier fraction, 0.0–0.5
    pub contamination: f64,
    /// Subsample size per tree (capped at the batch size)
    pub max_samples: usize,
    pub random_state: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            contamination: 0.1,
            max_samples: 256,
            random_state: 42,
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
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

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(x: &Array2<f64>, idx: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        if depth >= limit || idx.len() <= 1 {
            return Node::Leaf { size: idx.len() };
        }

        // only columns that still vary inside this node can split it
        let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
        for f in 0..x.ncols() {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = x[[i, f]];
                (lo.min(v), hi.max(v))
            });
            if lo < hi {
                candidates.push((f, lo, hi));
            }
        }
        if candidates.is_empty() {
            return Node::Leaf { size: idx.len() };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| x[[i, feature]] < threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(x, left, depth + 1, limit, rng)),
            right: Box::new(Node::build(x, right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, row: &ArrayView1<f64>, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    params: IsolationForestParams,
    trees: Vec<Node>,
    sample_size: usize,
    n_features: usize,
    /// Scores strictly below this are outliers
    offset: f64,
}

impl IsolationForest {
    pub fn fit(x: &Array2<f64>, params: IsolationForestParams) -> Result<Self, ModelError> {
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyBatch);
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        let sample_size = params.max_samples.clamp(1, n);
        let limit = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let idx = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                Node::build(x, idx, 0, limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params,
            trees,
            sample_size,
            n_features: x.ncols(),
            offset: f64::NEG_INFINITY,
        };
        let training = forest.score_samples(x)?;
        forest.offset = percentile(&training, params.contamination.clamp(0.0, 0.5) * 100.0);
        Ok(forest)
    }

    /// One score per row; lower is more anomalous.
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        if x.ncols() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        let norm = match average_path_length(self.sample_size) {
            c if c > 0.0 => c,
            _ => 1.0,
        };
        let trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(&row, 0)).sum::<f64>() / trees;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect())
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        score < self.offset
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }
}

/// Linear-interpolated percentile, `q` in 0–100.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_length_normaliser() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244).abs() < 0.01, "c(256) = {}", c256);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 4.0);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn isolated_point_scores_lowest() {
        let mut data = vec![0.0; 20 * 2];
        data[38] = 50.0;
        data[39] = -50.0;
        let x = Array2::from_shape_vec((20, 2), data).unwrap();
        let forest = IsolationForest::fit(&x, IsolationForestParams::default()).unwrap();
        let scores = forest.score_samples(&x).unwrap();
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(scores[19], min);
        assert!(forest.is_outlier(scores[19]));
        assert!(!forest.is_outlier(scores[0]));
    }
}
