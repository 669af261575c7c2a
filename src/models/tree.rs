//! Histogram CART shared by the random forest and gradient boosting.
//!
//! Features are quantile-binned once per fit; split search then scans
//! per-node histograms instead of re-sorting rows. Split thresholds are stored
//! as raw feature values, so prediction needs no binning.

use ndarray::{Array2, ArrayView1};
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Upper bound on bins per feature (bin ids are stored as `u8`).
pub const MAX_BINS: usize = 256;

/// Column-major binned copy of a feature matrix
#[derive(Debug, Clone)]
pub struct BinnedFeatures {
    /// Cut points per feature; bin `k` holds values in `(cuts[k-1], cuts[k]]`
    cuts: Vec<Vec<f64>>,
    /// Bin id per feature per sample
    bins: Vec<Vec<u8>>,
}

impl BinnedFeatures {
    pub fn new(features: &Array2<f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, MAX_BINS);

        let (cuts, bins): (Vec<Vec<f64>>, Vec<Vec<u8>>) = features
            .columns()
            .into_iter()
            .map(|column| {
                let cuts = cut_points(column, max_bins);
                let bins: Vec<u8> = column
                    .iter()
                    .map(|&x| cuts.partition_point(|&c| c < x) as u8)
                    .collect();
                (cuts, bins)
            })
            .unzip();

        Self { cuts, bins }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }
}

fn cut_points(column: ArrayView1<f64>, max_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = column.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut distinct = sorted.clone();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let n = sorted.len();
    let max = sorted[n - 1];
    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|k| sorted[k * n / max_bins])
        .filter(|&c| c < max)
        .collect();
    cuts.dedup();
    cuts
}

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    /// Gini impurity on 0/1 targets; leaves hold the positive fraction
    Gini,
    /// Second-order boosting gain on gradients/hessians; leaves hold Newton steps
    Newton { lambda: f64, min_child_weight: f64 },
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split (None = all)
    pub max_features: Option<usize>,
    pub criterion: Criterion,
}

/// Accumulated per-node statistics.
///
/// For `Gini`, `a` counts positives and `b` is unused. For `Newton`, `a` and
/// `b` sum gradients and hessians.
#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    n: f64,
    a: f64,
    b: f64,
}

impl Stats {
    fn add(&mut self, a: f64, b: f64) {
        self.n += 1.0;
        self.a += a;
        self.b += b;
    }

    fn minus(&self, other: &Stats) -> Stats {
        Stats {
            n: self.n - other.n,
            a: self.a - other.a,
            b: self.b - other.b,
        }
    }
}

impl Criterion {
    /// Node score; split gain is `score(left) + score(right) - score(parent)`
    fn score(&self, s: &Stats) -> f64 {
        match *self {
            Criterion::Gini => {
                if s.n <= 0.0 {
                    0.0
                } else {
                    -2.0 * s.a * (s.n - s.a) / s.n
                }
            }
            Criterion::Newton { lambda, .. } => s.a * s.a / (s.b + lambda),
        }
    }

    fn leaf_value(&self, s: &Stats) -> f64 {
        match *self {
            Criterion::Gini => {
                if s.n <= 0.0 {
                    0.0
                } else {
                    s.a / s.n
                }
            }
            Criterion::Newton { lambda, .. } => -s.a / (s.b + lambda),
        }
    }

    fn is_pure(&self, s: &Stats) -> bool {
        match self {
            Criterion::Gini => s.a <= 0.0 || s.a >= s.n,
            Criterion::Newton { .. } => false,
        }
    }

    fn child_allowed(&self, s: &Stats, min_samples_leaf: usize) -> bool {
        if s.n < min_samples_leaf as f64 || s.n <= 0.0 {
            return false;
        }
        match *self {
            Criterion::Gini => true,
            Criterion::Newton {
                min_child_weight, ..
            } => s.b >= min_child_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary decision tree stored as a node arena (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    bins: &'a BinnedFeatures,
    a: &'a [f64],
    b: &'a [f64],
    params: &'a TreeParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `indices` (repeats allowed).
    ///
    /// Returns the tree and the total split gain credited to each feature.
    pub fn fit(
        bins: &BinnedFeatures,
        a: &[f64],
        b: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> (Self, Vec<f64>) {
        let mut builder = TreeBuilder {
            bins,
            a,
            b,
            params,
            nodes: Vec::new(),
            importances: vec![0.0; bins.n_features()],
        };
        builder.grow(indices, 0, rng);

        (
            Self {
                nodes: builder.nodes,
            },
            builder.importances,
        )
    }

    /// Leaf value reached by `x`
    pub fn predict_one(&self, x: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let node_idx = self.nodes.len();
        let criterion = self.params.criterion;

        let mut stats = Stats::default();
        for &i in &indices {
            stats.add(self.a[i], self.b[i]);
        }
        self.nodes.push(Node::Leaf {
            value: criterion.leaf_value(&stats),
        });

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || criterion.is_pure(&stats)
        {
            return node_idx;
        }

        let best = match self.best_split(&indices, &stats, rng) {
            Some(best) => best,
            None => return node_idx,
        };

        self.importances[best.feature] += best.gain;

        let column = &self.bins.bins[best.feature];
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| (column[i] as usize) <= best.bin);

        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);

        self.nodes[node_idx] = Node::Split {
            feature: best.feature,
            threshold: self.bins.cuts[best.feature][best.bin],
            left,
            right,
        };

        node_idx
    }

    fn best_split(
        &self,
        indices: &[usize],
        parent: &Stats,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = self.bins.n_features();
        let candidates: Vec<usize> = match self.params.max_features {
            Some(m) if m < n_features => index::sample(rng, n_features, m.max(1)).into_vec(),
            _ => (0..n_features).collect(),
        };

        let criterion = self.params.criterion;
        let parent_score = criterion.score(parent);
        let mut best: Option<BestSplit> = None;

        for feature in candidates {
            let n_bins = self.bins.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            let column = &self.bins.bins[feature];
            let mut histogram = vec![Stats::default(); n_bins];
            for &i in indices {
                histogram[column[i] as usize].add(self.a[i], self.b[i]);
            }

            let mut left = Stats::default();
            // the last bin has no cut point above it
            for (bin, bin_stats) in histogram.iter().enumerate().take(n_bins - 1) {
                left.n += bin_stats.n;
                left.a += bin_stats.a;
                left.b += bin_stats.b;
                let right = parent.minus(&left);

                if !criterion.child_allowed(&left, self.params.min_samples_leaf)
                    || !criterion.child_allowed(&right, self.params.min_samples_leaf)
                {
                    continue;
                }

                let gain = criterion.score(&left) + criterion.score(&right) - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature, bin, gain });
                }
            }
        }

        best
    }
}
