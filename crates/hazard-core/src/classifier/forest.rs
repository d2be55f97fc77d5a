//! Bagged CART random forest in probability mode.
//!
//! Each tree is grown on a bootstrap sample with Gini impurity, drawing a
//! fresh random subset of candidate features at every split. A leaf stores the
//! fraction of events among its training rows; the forest probability is the
//! mean leaf value over trees. Importance is the total weighted Gini decrease
//! per feature; the out-of-bag error is the misclassification rate of each
//! row under the trees that did not see it.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{resolve_columns, Explanation, ProbabilisticClassifier, TrainedClassifier};
use crate::error::{HazardError, Result};
use crate::par::*;
use crate::sampler::TrainingTable;

const TREE_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Forest hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees, default 10.
    pub n_trees: usize,
    /// Maximum depth; None grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum rows on each side of a split, default 1.
    pub min_samples_leaf: usize,
    /// Candidate features per split; None uses ⌊√p⌋ (at least 1).
    pub features_per_split: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { n_trees: 10, max_depth: None, min_samples_leaf: 1, features_per_split: None }
    }
}

/// Untrained forest: parameters plus the seed for bootstrap and feature draws.
#[derive(Debug, Clone)]
pub struct RandomForest {
    pub params: ForestParams,
    pub seed: u64,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { p: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { p } => return p,
                Node::Split { feature, threshold, left, right } => {
                    id = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

#[inline]
fn gini(pos: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = pos as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

struct Best {
    decrease: f64,
    feature: usize,
    threshold: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    max_depth: usize,
    min_leaf: usize,
    mtry: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, idx: &mut [usize], depth: usize) -> usize {
        let n = idx.len();
        let pos = idx.iter().filter(|&&i| self.y[i] == 1).count();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { p: pos as f64 / n.max(1) as f64 });

        if pos == 0 || pos == n || depth >= self.max_depth || n < 2 * self.min_leaf {
            return id;
        }
        let Some(best) = self.best_split(idx, pos) else {
            return id;
        };

        self.importance[best.feature] += best.decrease;
        let mut mid = 0;
        for j in 0..n {
            if self.x[idx[j]][best.feature] <= best.threshold {
                idx.swap(mid, j);
                mid += 1;
            }
        }
        let (l, r) = idx.split_at_mut(mid);
        let left = self.grow(l, depth + 1);
        let right = self.grow(r, depth + 1);
        self.nodes[id] = Node::Split { feature: best.feature, threshold: best.threshold, left, right };
        id
    }

    fn best_split(&mut self, idx: &[usize], pos: usize) -> Option<Best> {
        let n = idx.len();
        let n_features = self.x[0].len();
        let parent = gini(pos, n) * n as f64;
        let candidates = rand::seq::index::sample(&mut self.rng, n_features, self.mtry);

        let mut best: Option<Best> = None;
        let mut order: Vec<usize> = idx.to_vec();
        for f in candidates.into_iter() {
            order.sort_by(|&a, &b| self.x[a][f].total_cmp(&self.x[b][f]));
            let mut left_pos = 0usize;
            for k in 0..n - 1 {
                if self.y[order[k]] == 1 {
                    left_pos += 1;
                }
                let (lo, hi) = (self.x[order[k]][f], self.x[order[k + 1]][f]);
                let nl = k + 1;
                let nr = n - nl;
                if lo == hi || nl < self.min_leaf || nr < self.min_leaf {
                    continue;
                }
                let child = gini(left_pos, nl) * nl as f64 + gini(pos - left_pos, nr) * nr as f64;
                let decrease = parent - child;
                if decrease > 1e-12 && best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(Best { decrease, feature: f, threshold });
                }
            }
        }
        best
    }
}

/// Out-of-bag misclassification over the rows at least one tree left out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OobScore {
    /// Misclassification rate in [0, 1]; 0 when no row was out of bag.
    pub error: f64,
    pub rows: usize,
}

impl OobScore {
    pub fn accuracy(&self) -> f64 {
        1.0 - self.error
    }
}

/// A feature with its summed Gini decrease, as ranked by the forest.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFeature {
    pub name: String,
    pub importance: f64,
}

/// A fitted forest.
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
    importance: Vec<f64>,
    oob: OobScore,
}

impl RandomForestModel {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn oob_score(&self) -> OobScore {
        self.oob
    }

    /// Features by descending importance; ties keep feature order.
    pub fn ranked_features(&self) -> Vec<RankedFeature> {
        let mut ranked: Vec<RankedFeature> = self
            .feature_names
            .iter()
            .zip(&self.importance)
            .map(|(name, &importance)| RankedFeature { name: name.clone(), importance })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked
    }
}

impl TrainedClassifier for RandomForestModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }

    fn explain(&self) -> Explanation {
        let variable_importance = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect();
        let mut extra = BTreeMap::new();
        extra.insert("numberOfTrees".to_string(), self.trees.len() as f64);
        extra.insert("outOfBagRows".to_string(), self.oob.rows as f64);
        Explanation { variable_importance, internal_error_estimate: self.oob.error, extra }
    }
}

impl ProbabilisticClassifier for RandomForest {
    type Model = RandomForestModel;

    fn train(&self, table: &TrainingTable, label_column: &str, feature_columns: &[String]) -> Result<RandomForestModel> {
        let cols = resolve_columns(table, label_column, feature_columns)?;
        if self.params.n_trees == 0 {
            return Err(HazardError::InvalidConfig("forest needs at least one tree".into()));
        }
        let events = table.event_count();
        if events == 0 || events == table.len() {
            return Err(HazardError::insufficient(format!(
                "training table needs both classes ({} rows, {} events)",
                table.len(),
                events
            )));
        }

        let x: Vec<Vec<f64>> = table.rows.iter().map(|r| cols.iter().map(|&c| r.features[c]).collect()).collect();
        let y: Vec<u8> = table.rows.iter().map(|r| r.label).collect();
        let n = x.len();
        let p = cols.len();
        let mtry = self
            .params
            .features_per_split
            .unwrap_or_else(|| (p as f64).sqrt().floor() as usize)
            .clamp(1, p);
        let max_depth = self.params.max_depth.unwrap_or(usize::MAX);
        let min_leaf = self.params.min_samples_leaf.max(1);
        let seed = self.seed;

        let grown: Vec<(Tree, Vec<bool>, Vec<f64>)> = (0..self.params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed ^ TREE_SALT.wrapping_mul(t as u64 + 1));
                let mut in_bag = vec![false; n];
                let mut idx: Vec<usize> = (0..n)
                    .map(|_| {
                        let i = rng.gen_range(0..n);
                        in_bag[i] = true;
                        i
                    })
                    .collect();
                let mut builder = TreeBuilder {
                    x: &x,
                    y: &y,
                    max_depth,
                    min_leaf,
                    mtry,
                    rng,
                    nodes: Vec::new(),
                    importance: vec![0.0; p],
                };
                builder.grow(&mut idx, 0);
                (Tree { nodes: builder.nodes }, in_bag, builder.importance)
            })
            .collect();

        let mut importance = vec![0.0; p];
        for (_, _, imp) in &grown {
            for (acc, v) in importance.iter_mut().zip(imp) {
                *acc += v;
            }
        }

        let mut oob_rows = 0usize;
        let mut oob_wrong = 0usize;
        for i in 0..n {
            let votes: Vec<f64> = grown
                .iter()
                .filter(|(_, in_bag, _)| !in_bag[i])
                .map(|(tree, _, _)| tree.predict(&x[i]))
                .collect();
            if votes.is_empty() {
                continue;
            }
            oob_rows += 1;
            let prob = votes.iter().sum::<f64>() / votes.len() as f64;
            if (prob >= 0.5) != (y[i] == 1) {
                oob_wrong += 1;
            }
        }
        let oob = OobScore {
            error: if oob_rows == 0 { 0.0 } else { oob_wrong as f64 / oob_rows as f64 },
            rows: oob_rows,
        };

        let trees: Vec<Tree> = grown.into_iter().map(|(t, _, _)| t).collect();
        info!(trees = trees.len(), rows = n, features = p, mtry, oob_error = oob.error, "random forest trained");

        Ok(RandomForestModel {
            feature_names: feature_columns.to_vec(),
            trees,
            importance,
            oob,
        })
    }
}
