//! Threshold-sweep ROC analysis of a probability surface on held-out points.
//!
//! Each held-out point is scored with the maximum probability inside its
//! footprint, which tolerates small offsets between the inventory and the
//! prediction grid. For every cutoff `c` of an inclusive, evenly spaced sweep:
//!
//!   TPR(c)  = |events with score > c| / |events|
//!   TNR(c)  = |non-events with score < c| / |non-events|
//!   FPR(c)  = 1 − TNR(c)
//!   dist(c) = √((TPR − 1)² + (TNR − 1)²)
//!
//! Both comparisons are strict at every cutoff, including the sweep ends.
//! AUC is the trapezoidal integral of TPR over FPR after sorting the points by
//! FPR (then TPR) ascending. The best cutoff minimises `dist`, ties going to
//! the smaller cutoff.
//!
//! Because both ends of the sweep are strict, a perfect classifier scoring
//! events at `max` and non-events at `min` lands on the corners (FPR 1, TPR 1)
//! and (FPR 0, TPR 0) at the two end cutoffs. It needs at least one interior
//! cutoff to reach AUC 1.0, so `steps = 2` yields 0.5; use `steps ≥ 3`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HazardError, Result};
use crate::par::*;
use crate::points::LabeledPoint;
use crate::surface::ProbabilitySurface;

/// Sweep bounds and resolution. `steps` cutoffs cover `[min, max]` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocSweep {
    pub min: f64,
    pub max: f64,
    pub steps: usize,
}

impl Default for RocSweep {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0, steps: 1000 }
    }
}

impl RocSweep {
    pub fn new(min: f64, max: f64, steps: usize) -> Self {
        Self { min, max, steps }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(HazardError::InvalidConfig(format!(
                "ROC sweep needs finite min < max, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.steps < 2 {
            return Err(HazardError::InvalidConfig(format!(
                "ROC sweep needs at least 2 steps, got {}",
                self.steps
            )));
        }
        Ok(())
    }

    /// `c_i = min + i·(max − min)/(steps − 1)`; the last cutoff is exactly `max`.
    pub fn cutoffs(&self) -> Result<Vec<f64>> {
        self.validate()?;
        let last = self.steps - 1;
        let step = (self.max - self.min) / last as f64;
        Ok((0..self.steps)
            .map(|i| if i == last { self.max } else { self.min + i as f64 * step })
            .collect())
    }
}

/// One row of the ROC table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub cutoff: f64,
    #[serde(rename = "TPR")]
    pub tpr: f64,
    #[serde(rename = "TNR")]
    pub tnr: f64,
    #[serde(rename = "FPR")]
    pub fpr: f64,
    pub dist: f64,
}

/// ROC points ordered by ascending cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocTable {
    points: Vec<RocPoint>,
}

impl RocTable {
    /// Build from points already ordered by strictly ascending cutoff.
    pub fn from_points(points: Vec<RocPoint>) -> Result<Self> {
        if points.windows(2).any(|w| !(w[0].cutoff < w[1].cutoff)) {
            return Err(HazardError::InvalidConfig("ROC cutoffs must be strictly increasing".into()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[RocPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Trapezoidal area under the curve: points sorted by FPR, then TPR.
    pub fn auc(&self) -> f64 {
        let mut curve: Vec<(f64, f64)> = self.points.iter().map(|p| (p.fpr, p.tpr)).collect();
        curve.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        curve
            .windows(2)
            .map(|w| (w[1].0 - w[0].0).abs() * (w[1].1 + w[0].1) / 2.0)
            .sum()
    }

    /// Point closest to perfect classification; ties go to the smaller cutoff.
    pub fn best(&self) -> Option<RocPoint> {
        self.points.iter().copied().min_by(|a, b| {
            a.dist
                .partial_cmp(&b.dist)
                .unwrap_or(Ordering::Equal)
                .then(a.cutoff.total_cmp(&b.cutoff))
        })
    }
}

/// A held-out point's extracted score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPoint {
    pub score: f64,
    pub is_target: bool,
}

/// Outcome of one evaluation run.
#[derive(Debug, Clone)]
pub struct RocEvaluation {
    pub table: RocTable,
    pub auc: f64,
    pub best: RocPoint,
    pub n_events: usize,
    pub n_non_events: usize,
    /// Held-out points outside the surface or on all-no-data footprints.
    pub dropped: usize,
}

/// Score held-out points by the footprint maximum of the surface.
/// Returns the scored points and the number dropped.
pub fn extract_scores(
    surface: &ProbabilitySurface,
    events: &[LabeledPoint],
    non_events: &[LabeledPoint],
    scale_m: f64,
) -> (Vec<ScoredPoint>, usize) {
    let mut scored = Vec::with_capacity(events.len() + non_events.len());
    let mut dropped = 0usize;
    for (pool, is_target) in [(events, true), (non_events, false)] {
        for p in pool {
            match surface.footprint_max(p.location, scale_m) {
                Some(v) => scored.push(ScoredPoint { score: v as f64, is_target }),
                None => dropped += 1,
            }
        }
    }
    (scored, dropped)
}

/// Sweep `sweep` over already-scored points.
pub fn roc_table(scored: &[ScoredPoint], sweep: &RocSweep) -> Result<RocTable> {
    let cutoffs = sweep.cutoffs()?;

    let mut targets: Vec<f64> = scored.iter().filter(|s| s.is_target).map(|s| s.score).collect();
    let mut others: Vec<f64> = scored.iter().filter(|s| !s.is_target).map(|s| s.score).collect();
    if targets.is_empty() || others.is_empty() {
        return Err(HazardError::insufficient(format!(
            "ROC needs both classes held out ({} events, {} non-events)",
            targets.len(),
            others.len()
        )));
    }
    targets.sort_by(f64::total_cmp);
    others.sort_by(f64::total_cmp);
    let n_t = targets.len() as f64;
    let n_o = others.len() as f64;

    let points = cutoffs
        .par_iter()
        .map(|&cutoff| {
            let above = targets.len() - targets.partition_point(|&s| s <= cutoff);
            let below = others.partition_point(|&s| s < cutoff);
            let tpr = above as f64 / n_t;
            let tnr = below as f64 / n_o;
            RocPoint {
                cutoff,
                tpr,
                tnr,
                fpr: 1.0 - tnr,
                dist: ((tpr - 1.0).powi(2) + (tnr - 1.0).powi(2)).sqrt(),
            }
        })
        .collect();

    RocTable::from_points(points)
}

/// Full evaluation: extract scores, sweep, integrate, pick the best cutoff.
pub fn evaluate(
    surface: &ProbabilitySurface,
    events: &[LabeledPoint],
    non_events: &[LabeledPoint],
    sweep: &RocSweep,
    scale_m: f64,
) -> Result<RocEvaluation> {
    sweep.validate()?;
    let (scored, dropped) = extract_scores(surface, events, non_events, scale_m);
    if dropped > 0 {
        warn!(dropped, "held-out points without a score were dropped");
    }
    let n_events = scored.iter().filter(|s| s.is_target).count();
    let n_non_events = scored.len() - n_events;

    let table = roc_table(&scored, sweep)?;
    let auc = table.auc();
    let best = table
        .best()
        .ok_or_else(|| HazardError::insufficient("ROC table is empty"))?;

    info!(auc, best_cutoff = best.cutoff, n_events, n_non_events, steps = table.len(), "ROC evaluated");
    Ok(RocEvaluation { table, auc, best, n_events, n_non_events, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::coords::Bounds;
    use crate::raster::Grid;

    fn scored(events: &[f64], non_events: &[f64]) -> Vec<ScoredPoint> {
        events
            .iter()
            .map(|&score| ScoredPoint { score, is_target: true })
            .chain(non_events.iter().map(|&score| ScoredPoint { score, is_target: false }))
            .collect()
    }

    fn point(cutoff: f64, tpr: f64, tnr: f64) -> RocPoint {
        RocPoint { cutoff, tpr, tnr, fpr: 1.0 - tnr, dist: ((tpr - 1.0).powi(2) + (tnr - 1.0).powi(2)).sqrt() }
    }

    #[test]
    fn sweep_has_exactly_steps_increasing_cutoffs() {
        for steps in [2usize, 3, 4, 10, 1000] {
            let c = RocSweep::new(0.0, 1.0, steps).cutoffs().unwrap();
            assert_eq!(c.len(), steps);
            assert_eq!(c[0], 0.0);
            assert_eq!(c[steps - 1], 1.0);
            assert!(c.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn degenerate_sweeps_are_rejected() {
        assert!(RocSweep::new(0.0, 1.0, 1).cutoffs().is_err());
        assert!(RocSweep::new(1.0, 1.0, 10).cutoffs().is_err());
        assert!(RocSweep::new(0.0, f64::NAN, 10).cutoffs().is_err());
    }

    /// Events at 0.9, non-events at 0.1, four cutoffs. Hand-computed:
    ///   cutoff  TPR  TNR  FPR
    ///   0       1    0    1
    ///   1/3     1    1    0
    ///   2/3     1    1    0
    ///   1       0    1    0
    /// Sorted by (FPR, TPR): (0,0) (0,1) (0,1) (1,1) → AUC = 1.
    #[test]
    fn four_step_sweep_matches_hand_computed_table() {
        let pts = scored(&[0.9; 30], &[0.1; 30]);
        let table = roc_table(&pts, &RocSweep::new(0.0, 1.0, 4)).unwrap();
        let p = table.points();
        assert_eq!(p.len(), 4);
        let cut: Vec<f64> = p.iter().map(|x| x.cutoff).collect();
        assert_abs_diff_eq!(cut[1], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cut[2], 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(p.iter().map(|x| x.tpr).collect::<Vec<_>>(), vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(p.iter().map(|x| x.tnr).collect::<Vec<_>>(), vec![0.0, 1.0, 1.0, 1.0]);
        assert_eq!(p.iter().map(|x| x.fpr).collect::<Vec<_>>(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(table.auc(), 1.0, epsilon = 1e-12);
        let best = table.best().unwrap();
        assert_abs_diff_eq!(best.cutoff, 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(best.dist, 0.0);
    }

    #[test]
    fn perfect_classifier_has_unit_auc() {
        let pts = scored(&[1.0; 50], &[0.0; 50]);
        for steps in [3usize, 4, 11, 1000] {
            let table = roc_table(&pts, &RocSweep::new(0.0, 1.0, steps)).unwrap();
            assert_abs_diff_eq!(table.auc(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn two_step_sweep_only_sees_the_corners() {
        // Strict comparisons at both ends leave (FPR, TPR) = (1, 1) and (0, 0).
        let pts = scored(&[1.0; 5], &[0.0; 5]);
        let table = roc_table(&pts, &RocSweep::new(0.0, 1.0, 2)).unwrap();
        assert_abs_diff_eq!(table.auc(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn indistinguishable_classes_give_half_auc() {
        let mut rng = StdRng::seed_from_u64(42);
        let events: Vec<f64> = (0..5000).map(|_| rng.gen::<f64>()).collect();
        let non_events: Vec<f64> = (0..5000).map(|_| rng.gen::<f64>()).collect();
        let table = roc_table(&scored(&events, &non_events), &RocSweep::default()).unwrap();
        assert_eq!(table.len(), 1000);
        assert_abs_diff_eq!(table.auc(), 0.5, epsilon = 0.05);
    }

    #[test]
    fn inverted_classifier_has_zero_auc() {
        let pts = scored(&[0.1; 10], &[0.9; 10]);
        let table = roc_table(&pts, &RocSweep::new(0.0, 1.0, 101)).unwrap();
        assert_abs_diff_eq!(table.auc(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn best_is_the_known_minimum_distance_row() {
        let table = RocTable::from_points(vec![
            point(0.1, 1.0, 0.2),
            point(0.2, 0.9, 0.6),
            point(0.3, 0.8, 0.9),
            point(0.4, 0.5, 0.95),
        ])
        .unwrap();
        assert_eq!(table.best().unwrap(), point(0.3, 0.8, 0.9));
    }

    #[test]
    fn best_ties_go_to_the_smaller_cutoff() {
        let table = RocTable::from_points(vec![point(0.2, 0.5, 1.0), point(0.4, 1.0, 0.5), point(0.6, 0.5, 1.0)])
            .unwrap();
        assert_eq!(table.best().unwrap().cutoff, 0.2);
    }

    #[test]
    fn unordered_points_are_rejected() {
        assert!(RocTable::from_points(vec![point(0.5, 1.0, 1.0), point(0.5, 1.0, 1.0)]).is_err());
    }

    #[test]
    fn empty_class_pool_is_insufficient() {
        for pts in [scored(&[], &[0.2, 0.3]), scored(&[0.7], &[])] {
            let err = roc_table(&pts, &RocSweep::default()).unwrap_err();
            assert!(matches!(err, HazardError::InsufficientEvaluationData { .. }));
        }
    }

    #[test]
    fn evaluate_uses_footprint_maximum() {
        let grid = Grid::from_bounds_and_scale(Bounds { min_lon: 0.0, max_lon: 0.01, min_lat: 0.0, max_lat: 0.01 }, 30.0)
            .unwrap();
        let mut data = vec![0.1f32; grid.len()];
        // A single high pixel next to the event location.
        data[10 * grid.width + 11] = 0.9;
        let surface = ProbabilitySurface::new(grid, data).unwrap();

        let e = grid.cell_center(10, 10);
        let n = grid.cell_center(30, 30);
        let events = [LabeledPoint::event(e.lat, e.lon)];
        let non_events = [LabeledPoint::non_event(n.lat, n.lon), LabeledPoint::non_event(5.0, 5.0)];

        let eval = evaluate(&surface, &events, &non_events, &RocSweep::new(0.0, 1.0, 11), 100.0).unwrap();
        assert_eq!((eval.n_events, eval.n_non_events, eval.dropped), (1, 1, 1));
        assert_abs_diff_eq!(eval.auc, 1.0, epsilon = 1e-12);
        assert!(eval.best.cutoff > 0.1 && eval.best.cutoff < 0.9);

        let point_only = evaluate(&surface, &events, &non_events, &RocSweep::new(0.0, 1.0, 11), 0.0).unwrap();
        assert!(point_only.auc < 1.0);
    }

    #[test]
    fn evaluate_without_held_out_events_fails() {
        let grid = Grid::from_bounds_and_scale(Bounds { min_lon: 0.0, max_lon: 0.01, min_lat: 0.0, max_lat: 0.01 }, 30.0)
            .unwrap();
        let surface = ProbabilitySurface::new(grid, vec![0.5; grid.len()]).unwrap();
        let c = grid.cell_center(3, 3);
        let err = evaluate(&surface, &[], &[LabeledPoint::non_event(c.lat, c.lon)], &RocSweep::default(), 100.0)
            .unwrap_err();
        assert!(matches!(err, HazardError::InsufficientEvaluationData { .. }));
    }
}
