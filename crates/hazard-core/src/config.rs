use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ForestParams;
use crate::error::{HazardError, Result};
use crate::raster::Resampling;
use crate::roc::RocSweep;
use crate::sampler::OutOfExtentPolicy;

/// Run configuration. Every field has a documented default; a JSON file may
/// set any subset of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the train/test split and the forest, default 42.
    pub seed: u64,
    /// Fraction of each class pool used for training, default 0.7.
    pub split_fraction: f64,
    /// Footprint (metres) for training-table extraction, default 90.
    pub sampling_scale_m: f64,
    /// Reference grid cell size (metres) for the feature stack, default 90.
    pub stack_scale_m: f64,
    /// Footprint (metres) for held-out score extraction, default 100.
    pub evaluation_scale_m: f64,
    /// Hazard raster pixel size (metres), default 30.
    pub export_scale_m: f64,
    /// Cutoff sweep, default `[0, 1]` with 1000 steps.
    pub roc: RocSweep,
    /// Covariate and export resampling, default nearest.
    pub resampling: Resampling,
    /// Handling of training points outside the stack, default warn.
    pub out_of_extent: OutOfExtentPolicy,
    /// Label column of the training table, default `slide`.
    pub label_column: String,
    pub forest: ForestParams,
    /// Bands the model is trained on, in order. Each must be provided by a
    /// covariate; None stacks every covariate in input order.
    pub bands: Option<Vec<String>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            split_fraction: 0.7,
            sampling_scale_m: 90.0,
            stack_scale_m: 90.0,
            evaluation_scale_m: 100.0,
            export_scale_m: 30.0,
            roc: RocSweep::default(),
            resampling: Resampling::Nearest,
            out_of_extent: OutOfExtentPolicy::Warn,
            label_column: "slide".to_string(),
            forest: ForestParams::default(),
            bands: None,
        }
    }
}

impl RunConfig {
    /// Read a (possibly partial) configuration file; missing fields keep
    /// their defaults. Not validated.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reject values no stage could run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.split_fraction > 0.0 && self.split_fraction < 1.0) {
            return Err(HazardError::InvalidConfig(format!(
                "split_fraction must be in (0, 1), got {}",
                self.split_fraction
            )));
        }
        for (name, v) in [
            ("sampling_scale_m", self.sampling_scale_m),
            ("stack_scale_m", self.stack_scale_m),
            ("evaluation_scale_m", self.evaluation_scale_m),
            ("export_scale_m", self.export_scale_m),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(HazardError::InvalidConfig(format!("{name} must be positive, got {v}")));
            }
        }
        if self.label_column.is_empty() {
            return Err(HazardError::InvalidConfig("label_column is empty".into()));
        }
        if self.forest.n_trees == 0 {
            return Err(HazardError::InvalidConfig("forest.n_trees must be at least 1".into()));
        }
        if self.bands.as_ref().is_some_and(|b| b.is_empty()) {
            return Err(HazardError::InvalidConfig("bands is empty".into()));
        }
        self.roc.validate()
    }
}
