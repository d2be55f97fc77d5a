//! Feature stack assembly: every covariate is reduced to one band, read onto
//! a common reference grid and stored under its canonical band name.

pub mod terrain;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HazardError, Result};
use crate::par::*;
use crate::raster::{Grid, Raster, Resampling};

/// Per-pixel reduction applied to a time-series covariate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Mean,
    Max,
    Min,
}

impl Reduction {
    /// Reduce the finite values of one pixel across frames. NaN if none.
    pub fn apply(self, values: impl Iterator<Item = f32>) -> f32 {
        let mut n = 0usize;
        let mut acc = match self {
            Reduction::Mean => 0.0f64,
            Reduction::Max => f64::NEG_INFINITY,
            Reduction::Min => f64::INFINITY,
        };
        for v in values.filter(|v| v.is_finite()) {
            let v = v as f64;
            acc = match self {
                Reduction::Mean => acc + v,
                Reduction::Max => acc.max(v),
                Reduction::Min => acc.min(v),
            };
            n += 1;
        }
        match (n, self) {
            (0, _) => f32::NAN,
            (_, Reduction::Mean) => (acc / n as f64) as f32,
            _ => acc as f32,
        }
    }
}

/// Where a covariate band comes from.
#[derive(Debug, Clone)]
pub enum CovariateSource {
    /// A single-band raster, used as is.
    Raster(Raster),
    /// A time series collapsed to one band per pixel.
    Series { frames: Vec<Raster>, reduction: Reduction },
    /// Terrain slope (degrees) derived from an elevation raster.
    Slope(Raster),
}

/// A named covariate source and the canonical band name it fills.
#[derive(Debug, Clone)]
pub struct Covariate {
    /// Source identity, e.g. the dataset name.
    pub name: String,
    /// Canonical band name in the feature stack.
    pub band: String,
    pub source: CovariateSource,
}

impl Covariate {
    pub fn new(name: impl Into<String>, source: CovariateSource) -> Self {
        let name = name.into();
        Self { band: name.clone(), name, source }
    }

    pub fn raster(name: impl Into<String>, raster: Raster) -> Self {
        Self::new(name, CovariateSource::Raster(raster))
    }

    pub fn series(name: impl Into<String>, frames: Vec<Raster>, reduction: Reduction) -> Self {
        Self::new(name, CovariateSource::Series { frames, reduction })
    }

    pub fn slope(name: impl Into<String>, dem: Raster) -> Self {
        Self::new(name, CovariateSource::Slope(dem))
    }

    /// Store this covariate under a different band name.
    pub fn renamed(mut self, band: impl Into<String>) -> Self {
        self.band = band.into();
        self
    }

    /// Reduce to one band on `grid`.
    fn render(&self, grid: &Grid, method: Resampling) -> Result<Vec<f32>> {
        let raster = match &self.source {
            CovariateSource::Raster(r) => r.resample_to(grid, method),
            CovariateSource::Slope(dem) => terrain::slope_degrees(dem).resample_to(grid, method),
            CovariateSource::Series { frames, reduction } => {
                if frames.is_empty() {
                    return Err(HazardError::InvalidConfig(format!(
                        "time series `{}` has no frames",
                        self.name
                    )));
                }
                let aligned: Vec<Raster> = frames.iter().map(|f| f.resample_to(grid, method)).collect();
                let data = (0..grid.len())
                    .map(|i| reduction.apply(aligned.iter().map(|f| f.data[i])))
                    .collect();
                Raster { data, grid: *grid }
            }
        };
        Ok(raster.data)
    }
}

/// One named band of a `FeatureStack`.
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    /// Row-major values on the stack grid.
    pub data: Vec<f32>,
}

/// Multi-band raster; all bands share `grid`.
#[derive(Debug, Clone)]
pub struct FeatureStack {
    grid: Grid,
    bands: Vec<Band>,
}

impl FeatureStack {
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b.name == name)
    }

    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f32 {
        self.bands[band].data[row * self.grid.width + col]
    }
}

/// Assembles a `FeatureStack` on a fixed reference grid.
#[derive(Debug, Clone)]
pub struct FeatureStackBuilder {
    grid: Grid,
    resampling: Resampling,
    covariates: Vec<Covariate>,
}

impl FeatureStackBuilder {
    pub fn new(grid: Grid, resampling: Resampling) -> Self {
        Self { grid, resampling, covariates: Vec::new() }
    }

    pub fn add(mut self, covariate: Covariate) -> Self {
        self.covariates.push(covariate);
        self
    }

    pub fn extend(mut self, covariates: impl IntoIterator<Item = Covariate>) -> Self {
        self.covariates.extend(covariates);
        self
    }

    /// Stack every registered covariate, in registration order.
    pub fn build_all(&self) -> Result<FeatureStack> {
        let names: Vec<String> = self.covariates.iter().map(|c| c.band.clone()).collect();
        self.build(&names)
    }

    /// Stack the declared bands, in declared order.
    ///
    /// Fails with `MissingCovariate` when a declared band has no source and
    /// with `DuplicateBand` when a name is declared or provided twice.
    pub fn build<S: AsRef<str>>(&self, declared: &[S]) -> Result<FeatureStack> {
        for (i, c) in self.covariates.iter().enumerate() {
            if self.covariates[..i].iter().any(|o| o.band == c.band) {
                return Err(HazardError::DuplicateBand { band: c.band.clone() });
            }
        }

        let mut selected: Vec<&Covariate> = Vec::with_capacity(declared.len());
        for (i, name) in declared.iter().enumerate() {
            let name = name.as_ref();
            if declared[..i].iter().any(|d| d.as_ref() == name) {
                return Err(HazardError::DuplicateBand { band: name.to_string() });
            }
            let cov = self
                .covariates
                .iter()
                .find(|c| c.band == name)
                .ok_or_else(|| HazardError::missing(name))?;
            selected.push(cov);
        }

        let grid = self.grid;
        let method = self.resampling;
        let bands = selected
            .par_iter()
            .map(|cov| {
                let data = cov.render(&grid, method)?;
                debug!(band = %cov.band, source = %cov.name, "band aligned to reference grid");
                Ok(Band { name: cov.band.clone(), data })
            })
            .collect::<Result<Vec<Band>>>()?;

        info!(
            bands = bands.len(),
            width = grid.width,
            height = grid.height,
            "feature stack built"
        );
        Ok(FeatureStack { grid, bands })
    }
}
