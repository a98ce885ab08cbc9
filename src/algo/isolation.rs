//! Isolation forest for out-of-distribution scoring of feature vectors.
//!
//! Each tree recursively splits a random subsample on a random dimension at
//! a random value until points are isolated or the height limit is hit.
//! Points that isolate quickly are anomalous: the score is
//! `2^(-E[h(x)] / c(n))`, near 1 for outliers and at or below 0.5 for
//! typical points.
//!
//! Reference: "Isolation Forest" (Liu, Ting, Zhou, ICDM 2008)

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::index;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum IsoNode {
    Internal {
        split_dim: usize,
        split_value: f64,
        left: Box<IsoNode>,
        right: Box<IsoNode>,
    },
    /// External node; `size` points ended here
    Leaf { size: usize },
}

/// Expected path length of an unsuccessful BST search over `n` points.
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

fn build(points: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> IsoNode {
    if points.len() <= 1 || depth >= max_depth {
        return IsoNode::Leaf { size: points.len() };
    }

    let dims = points[0].len();
    // only dimensions with spread can split
    let splittable: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|d| {
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[d]), hi.max(p[d]))
            });
            (hi > lo).then_some((d, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return IsoNode::Leaf { size: points.len() };
    }

    let (split_dim, lo, hi) = splittable[rng.random_range(0..splittable.len())];
    let split_value = lo + rng.random::<f64>() * (hi - lo);

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        points.iter().copied().partition(|p| p[split_dim] < split_value);

    IsoNode::Internal {
        split_dim,
        split_value,
        left: Box::new(build(&left, depth + 1, max_depth, rng)),
        right: Box::new(build(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &IsoNode, point: &[f64], depth: f64) -> f64 {
    match node {
        IsoNode::Leaf { size } => depth + average_path_length(*size),
        IsoNode::Internal {
            split_dim,
            split_value,
            left,
            right,
        } => {
            let value = point.get(*split_dim).copied().unwrap_or(0.0);
            if value < *split_value {
                path_length(left, point, depth + 1.0)
            } else {
                path_length(right, point, depth + 1.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsoNode>,
    sample_size: usize,
    dimensions: usize,
}

impl IsolationForest {
    /// Fit on `data`. Returns `None` for fewer than two points or rows of
    /// mismatched dimensionality.
    pub fn fit(data: &[Vec<f64>], num_trees: usize, sample_size: usize, rng: &mut StdRng) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let dimensions = data[0].len();
        if dimensions == 0 || data.iter().any(|row| row.len() != dimensions) {
            return None;
        }

        let sample_size = sample_size.clamp(2, data.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..num_trees.max(1))
            .map(|_| {
                let picked: Vec<&[f64]> = index::sample(rng, data.len(), sample_size)
                    .into_iter()
                    .map(|i| data[i].as_slice())
                    .collect();
                build(&picked, 0, max_depth, rng)
            })
            .collect();

        Some(Self {
            trees,
            sample_size,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Anomaly score in (0, 1].
    pub fn score(&self, point: &[f64]) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|t| path_length(t, point, 0.0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_depth / normalizer)
    }
}
