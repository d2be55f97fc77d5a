//! Predicted probability surface and its export rendition.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coords::{Boundary, LatLon};
use crate::error::{HazardError, Result};
use crate::raster::{Grid, Raster, Resampling};

/// Per-pixel event probability on the feature stack grid. NaN = no prediction.
#[derive(Debug, Clone)]
pub struct ProbabilitySurface {
    raster: Raster,
}

impl ProbabilitySurface {
    /// Wrap predicted values; finite values must lie in [0, 1].
    pub fn new(grid: Grid, data: Vec<f32>) -> Result<Self> {
        if let Some(v) = data.iter().find(|v| v.is_finite() && !(0.0..=1.0).contains(*v)) {
            return Err(HazardError::InvalidConfig(format!("probability {v} outside [0, 1]")));
        }
        Ok(Self { raster: Raster::from_data(grid, data)? })
    }

    pub fn grid(&self) -> &Grid {
        &self.raster.grid
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.raster.get(row, col)
    }

    /// Maximum finite probability within a `scale_m`-sided footprint around
    /// `p`. None outside the surface or when the footprint is all no-data.
    pub fn footprint_max(&self, p: LatLon, scale_m: f64) -> Option<f32> {
        let window = self.raster.grid.footprint(p, scale_m)?;
        self.raster.window_values(window).reduce(f32::max)
    }
}

/// Byte-scaled hazard raster: `floor(p × 100)` in 0..=100, `NODATA` elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRaster {
    pub grid: Grid,
    pub data: Vec<u8>,
}

impl HazardRaster {
    pub const NODATA: u8 = 255;

    /// Resample `surface` onto a grid covering `boundary` at `scale_m`, mask
    /// pixels whose centre lies outside the boundary, and scale to bytes.
    pub fn from_surface(
        surface: &ProbabilitySurface,
        boundary: &Boundary,
        scale_m: f64,
        method: Resampling,
    ) -> Result<Self> {
        let bounds = boundary
            .bounds()
            .ok_or_else(|| HazardError::InvalidConfig("boundary needs at least three vertices".into()))?;
        let grid = Grid::from_bounds_and_scale(bounds, scale_m)?;

        let mut data = Vec::with_capacity(grid.len());
        for r in 0..grid.height {
            for c in 0..grid.width {
                let centre = grid.cell_center(r, c);
                let v = if boundary.contains(centre) {
                    surface.raster.sample(centre, method).map_or(Self::NODATA, to_byte)
                } else {
                    Self::NODATA
                };
                data.push(v);
            }
        }

        let valid = data.iter().filter(|&&v| v != Self::NODATA).count();
        info!(width = grid.width, height = grid.height, valid, scale_m, "hazard raster rendered");
        Ok(Self { grid, data })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.grid.width + col]
    }
}

/// Probability → percent, truncated. NaN maps to `NODATA`.
fn to_byte(p: f32) -> u8 {
    if p.is_finite() {
        (p * 100.0).floor().clamp(0.0, 100.0) as u8
    } else {
        HazardRaster::NODATA
    }
}
