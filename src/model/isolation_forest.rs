//! Isolation forest outlier scorer.
//!
//! Each tree recursively splits a random sub-sample on a random feature at a
//! uniform point between that feature's min and max. Outliers isolate in
//! fewer splits, so a short average path length means "anomalous":
//!
//! ```text
//! h(x)  = depth of the leaf reached + c(leaf size)
//! c(n)  = 2 (ln(n - 1) + γ) - 2 (n - 1) / n      (c(1) = 0, c(2) = 1)
//! s(x)  = -2 ^ (-mean(h(x)) / c(max_samples))     in [-1, 0)
//! ```
//!
//! Lower `s` is more anomalous. The decision offset is the `contamination`
//! percentile of the training scores; a point is an outlier when `s < offset`.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::types::FEATURE_COUNT;

const EULER_GAMMA: f64 = 0.577_215_664_9;

type Row = [f64; FEATURE_COUNT];

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("need at least 2 training rows, got {0}")]
    InsufficientData(usize),
}

/// Forest hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Sub-sample size per tree, capped at the training set size
    pub max_samples: usize,
    pub contamination: f64,
    /// `None` seeds from entropy
    pub seed: Option<u64>,
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

/// One isolation tree stored as a node arena; index 0 is the root
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(rows: &[Row], sample: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, sample.to_vec(), 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        rows: &[Row],
        members: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: members.len(),
        });

        if depth >= max_depth || members.len() <= 1 {
            return slot;
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let (lo, hi) = members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(rows[i][f]), hi.max(rows[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return slot;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_members, right_members): (Vec<usize>, Vec<usize>) =
            members.into_iter().partition(|&i| rows[i][feature] <= threshold);

        let left = self.grow(rows, left_members, depth + 1, max_depth, rng);
        let right = self.grow(rows, right_members, depth + 1, max_depth, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn path_length(&self, row: &Row) -> f64 {
        let mut node = 0;
        let mut depth = 0usize;
        loop {
            match self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[feature] <= threshold { left } else { right };
                    depth += 1;
                }
                Node::Leaf { size } => return depth as f64 + average_path_length(size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
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

/// A fitted forest with its decision offset
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(rows: &[Row], params: ForestParams) -> Result<Self, ForestError> {
        if rows.len() < 2 {
            return Err(ForestError::InsufficientData(rows.len()));
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let sample_size = params.max_samples.clamp(2, rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let sample = index::sample(&mut rng, rows.len(), sample_size).into_vec();
                IsolationTree::build(rows, &sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };
        let training_scores: Vec<f64> = rows.iter().map(|r| forest.score_sample(r)).collect();
        forest.offset = percentile(&training_scores, params.contamination * 100.0);
        Ok(forest)
    }

    /// Negated anomaly score in [-1, 0); lower is more anomalous
    pub fn score_sample(&self, row: &Row) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
            / self.trees.len() as f64;
        -(2f64.powf(-mean_path / average_path_length(self.sample_size)))
    }

    /// Scores below this are outliers
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        score < self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Percentile with linear interpolation between closest ranks
fn percentile(values: &[f64], pct: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
