//! Isolation forest outlier detection.
//!
//! Each call to [`IsolationForest::fit_predict`] grows a fresh ensemble on the
//! given rows and labels those same rows: `1` for inliers, `-1` for outliers.
//! Roughly `contamination` of the rows end up labelled as outliers, because the
//! decision threshold is the matching percentile of the training scores.

use crate::errors::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

pub const INLIER: i8 = 1;
pub const OUTLIER: i8 = -1;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: None,
        }
    }
}

impl ForestConfig {
    pub fn check(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::Config("forest needs at least one tree".to_string()));
        }
        if self.max_samples == 0 {
            return Err(Error::Config("max_samples must be positive".to_string()));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(Error::Config(format!(
                "contamination {} must be in (0, 0.5]",
                self.contamination
            )));
        }
        Ok(())
    }
}

/// Labels and scores for every training row, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub labels: Vec<i8>,
    /// Higher is more normal; values lie in `[-1, 0)`.
    pub scores: Vec<f64>,
    pub threshold: f64,
}

impl Prediction {
    pub fn outlier_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == OUTLIER).count()
    }
}

#[derive(Debug)]
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

#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: ForestConfig,
}

impl IsolationForest {
    pub fn new(config: ForestConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Fits a new forest on `rows` and labels each of them.
    pub fn fit_predict<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<Prediction> {
        if rows.is_empty() {
            return Ok(Prediction {
                labels: Vec::new(),
                scores: Vec::new(),
                threshold: 0.0,
            });
        }

        let data: Vec<&[f64]> = rows.iter().map(|r| r.as_ref()).collect();
        let width = data[0].len();
        if width == 0 {
            return Err(Error::Model("rows have no columns".to_string()));
        }
        if let Some(pos) = data.iter().position(|r| r.len() != width) {
            return Err(Error::Model(format!(
                "row {} has {} columns, expected {}",
                pos,
                data[pos].len(),
                width
            )));
        }
        if let Some(pos) = data.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
            return Err(Error::Model(format!("row {} contains a non-finite value", pos)));
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let n = data.len();
        let psi = self.config.max_samples.min(n);
        let height_limit = (psi.max(2) as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..self.config.n_trees)
            .map(|_| {
                let idx = sample(&mut rng, n, psi).into_vec();
                grow(&data, idx, 0, height_limit, &mut rng)
            })
            .collect();

        let norm = average_path_length(psi);
        let scores: Vec<f64> = data
            .iter()
            .map(|row| {
                let mean_depth = trees
                    .iter()
                    .map(|tree| path_length(tree, row, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                // A one-row sample has no meaningful normaliser; every point scores alike.
                let ratio = if norm > 0.0 { mean_depth / norm } else { 1.0 };
                -(2f64.powf(-ratio))
            })
            .collect();

        let threshold = percentile(&scores, 100.0 * self.config.contamination);
        let labels = scores
            .iter()
            .map(|&s| if s < threshold { OUTLIER } else { INLIER })
            .collect();

        Ok(Prediction {
            labels,
            scores,
            threshold,
        })
    }
}

fn grow(data: &[&[f64]], idx: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if depth >= limit || idx.len() <= 1 {
        return Node::Leaf { size: idx.len() };
    }

    let width = data[idx[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = data[i][feature];
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: idx.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    // threshold < hi keeps the maximum on the right; `<=` keeps the minimum on the left.
    let (left, right): (Vec<usize>, Vec<usize>) =
        idx.into_iter().partition(|&i| data[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, limit, rng)),
        right: Box::new(grow(data, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] <= *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn seeded() -> IsolationForest {
        IsolationForest::new(ForestConfig {
            seed: Some(42),
            ..ForestConfig::default()
        })
        .unwrap()
    }

    fn cluster(n: usize, seed: u64) -> Vec<[f64; 4]> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                [
                    70.0 + rng.gen_range(-1.0..1.0),
                    100.0 + rng.gen_range(-2.0..2.0),
                    0.5 + rng.gen_range(-0.05..0.05),
                    150.0 + rng.gen_range(-3.0..3.0),
                ]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln 255 + gamma) - 2 * 255 / 256
        let c = average_path_length(256);
        assert!((c - 10.244_770_920_455_13).abs() < 1e-6, "got {}", c);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert!((percentile(&v, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_config_rejects_bad_contamination() {
        for c in [0.0, -0.1, 0.6, f64::NAN] {
            let cfg = ForestConfig {
                contamination: c,
                ..ForestConfig::default()
            };
            assert!(IsolationForest::new(cfg).is_err(), "contamination {}", c);
        }
    }

    #[test]
    fn test_empty_input() {
        let rows: Vec<[f64; 4]> = Vec::new();
        let prediction = seeded().fit_predict(&rows).unwrap();
        assert!(prediction.labels.is_empty());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(seeded().fit_predict(&rows), Err(Error::Model(_))));
    }

    #[test]
    fn test_single_row_is_inlier() {
        let prediction = seeded().fit_predict(&[[70.0, 100.0, 0.5, 150.0]]).unwrap();
        assert_eq!(prediction.labels, vec![INLIER]);
        assert_eq!(prediction.scores, vec![-0.5]);
    }

    #[test]
    fn test_far_point_is_outlier() {
        let mut rows = cluster(30, 7);
        rows.push([149.0, 900.0, 9.5, 5000.0]);

        let prediction = seeded().fit_predict(&rows).unwrap();
        assert_eq!(prediction.labels.len(), rows.len());
        assert_eq!(*prediction.labels.last().unwrap(), OUTLIER);

        let last = *prediction.scores.last().unwrap();
        assert!(prediction.scores.iter().all(|&s| s >= last));
    }

    #[test]
    fn test_contamination_sets_outlier_share() {
        let rows = cluster(200, 11);
        let prediction = seeded().fit_predict(&rows).unwrap();
        let outliers = prediction.outlier_count();
        assert!((15..=25).contains(&outliers), "got {} outliers", outliers);
    }

    #[test]
    fn test_seed_makes_fit_repeatable() {
        let rows = cluster(50, 3);
        let a = seeded().fit_predict(&rows).unwrap();
        let b = seeded().fit_predict(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_rows_are_all_inliers() {
        let rows = vec![[1.0, 1.0, 1.0, 1.0]; 20];
        let prediction = seeded().fit_predict(&rows).unwrap();
        assert_eq!(prediction.outlier_count(), 0);
    }

    #[test]
    fn test_labels_follow_reported_threshold() {
        let forest = seeded();
        assert_eq!(forest.config().contamination, 0.1);

        let prediction = forest.fit_predict(&cluster(40, 5)).unwrap();
        for (label, score) in prediction.labels.iter().zip(&prediction.scores) {
            if *label == OUTLIER {
                assert!(*score < prediction.threshold);
            } else {
                assert!(*score >= prediction.threshold);
            }
        }
        assert_eq!(
            prediction.threshold,
            percentile(&prediction.scores, 100.0 * forest.config().contamination)
        );
    }
}
