//! Classifier capability used by the pipeline.
//!
//! Training consumes a `TrainingTable`; the trained model predicts an event
//! probability per feature vector and reports variable importance plus an
//! internal error estimate. Any probabilistic learner can sit behind these
//! traits; `forest::RandomForest` is the bundled one.

pub mod forest;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HazardError, Result};
use crate::par::*;
use crate::sampler::TrainingTable;
use crate::stack::FeatureStack;
use crate::surface::ProbabilitySurface;

pub use forest::{ForestParams, OobScore, RandomForest, RandomForestModel, RankedFeature};

/// Model diagnostics exported next to the hazard raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Importance score per feature name.
    pub variable_importance: BTreeMap<String, f64>,
    /// Out-of-bag style error estimate in [0, 1].
    pub internal_error_estimate: f64,
    /// Learner-specific extras (e.g. tree count).
    pub extra: BTreeMap<String, f64>,
}

impl Explanation {
    /// Flatten into `key,value` rows: one `importance.<name>` row per feature,
    /// then `outOfBagErrorEstimate`, then the extras.
    pub fn rows(&self) -> Vec<(String, f64)> {
        let mut rows: Vec<(String, f64)> = self
            .variable_importance
            .iter()
            .map(|(k, v)| (format!("importance.{k}"), *v))
            .collect();
        rows.push(("outOfBagErrorEstimate".to_string(), self.internal_error_estimate));
        rows.extend(self.extra.iter().map(|(k, v)| (k.clone(), *v)));
        rows
    }
}

/// A learner that can be fitted on a training table.
pub trait ProbabilisticClassifier {
    type Model: TrainedClassifier;

    /// Fit on `feature_columns` of `table`, predicting `label_column`.
    fn train(&self, table: &TrainingTable, label_column: &str, feature_columns: &[String]) -> Result<Self::Model>;
}

/// An immutable fitted model.
pub trait TrainedClassifier: Sync {
    /// Feature names in the order `predict_row` expects them.
    fn feature_names(&self) -> &[String];

    /// Event probability in [0, 1] for one feature vector.
    fn predict_row(&self, features: &[f64]) -> f64;

    fn explain(&self) -> Explanation;

    /// Predict every pixel of `stack`. Bands are matched to features by name;
    /// pixels with any non-finite feature are NaN.
    fn predict_probability(&self, stack: &FeatureStack) -> Result<ProbabilitySurface> {
        let indices = self
            .feature_names()
            .iter()
            .map(|name| stack.band_index(name).ok_or_else(|| HazardError::missing(name.clone())))
            .collect::<Result<Vec<usize>>>()?;

        let grid = *stack.grid();
        let rows: Vec<Vec<f32>> = (0..grid.height)
            .into_par_iter()
            .map(|r| {
                let mut features = vec![0.0f64; indices.len()];
                (0..grid.width)
                    .map(|c| {
                        for (slot, &b) in features.iter_mut().zip(&indices) {
                            *slot = stack.get(b, r, c) as f64;
                        }
                        if features.iter().all(|v| v.is_finite()) {
                            self.predict_row(&features).clamp(0.0, 1.0) as f32
                        } else {
                            f32::NAN
                        }
                    })
                    .collect()
            })
            .collect();

        let data: Vec<f32> = rows.into_iter().flatten().collect();
        info!(pixels = data.len(), "probability surface predicted");
        ProbabilitySurface::new(grid, data)
    }
}

/// Resolve `feature_columns` against `table` and check the label column.
pub(crate) fn resolve_columns(table: &TrainingTable, label_column: &str, feature_columns: &[String]) -> Result<Vec<usize>> {
    if table.label_column != label_column {
        return Err(HazardError::InvalidConfig(format!(
            "label column `{label_column}` not in table (has `{}`)",
            table.label_column
        )));
    }
    if feature_columns.is_empty() {
        return Err(HazardError::InvalidConfig("no feature columns selected".into()));
    }
    feature_columns
        .iter()
        .map(|name| table.column_index(name).ok_or_else(|| HazardError::missing(name.clone())))
        .collect()
}
