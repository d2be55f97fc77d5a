//! Georeferenced single-band grids.
//!
//! Rasters are stored row-major with row 0 at `min_lat` (S→N), matching the
//! HeightField layout used by the sampling tools. Cell `(r, c)` covers
//! `[min_lon + c·dx, min_lon + (c+1)·dx] × [min_lat + r·dy, min_lat + (r+1)·dy]`.
//! No-data cells hold NaN.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coords::{Bounds, LatLon};
use crate::error::{HazardError, Result};

/// Ground distance of one degree of latitude, in metres.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Interpolation used when a raster is read at an arbitrary location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
}

/// Pixel grid: size and geographic extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Inclusive row/column window of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row0: usize,
    pub row1: usize,
    pub col0: usize,
    pub col1: usize,
}

impl Window {
    pub fn cells(self) -> impl Iterator<Item = (usize, usize)> {
        (self.row0..=self.row1).flat_map(move |r| (self.col0..=self.col1).map(move |c| (r, c)))
    }
}

impl Grid {
    pub fn new(width: usize, height: usize, bounds: Bounds) -> Self {
        Self {
            width,
            height,
            min_lon: bounds.min_lon,
            max_lon: bounds.max_lon,
            min_lat: bounds.min_lat,
            max_lat: bounds.max_lat,
        }
    }

    /// Grid covering `bounds` with square-on-the-ground cells of `scale_m` metres.
    ///
    /// Cell width in degrees of longitude is stretched by 1/cos(mid_lat) so that
    /// both axes span roughly `scale_m`. The extent is grown to a whole number of
    /// cells from the south-west corner.
    pub fn from_bounds_and_scale(bounds: Bounds, scale_m: f64) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(HazardError::InvalidConfig(format!("scale must be positive, got {scale_m}")));
        }
        let lat_extent = bounds.max_lat - bounds.min_lat;
        let lon_extent = bounds.max_lon - bounds.min_lon;
        if !(lat_extent > 0.0 && lon_extent > 0.0) {
            return Err(HazardError::InvalidConfig("grid bounds have zero extent".into()));
        }
        let mid_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
        let dy = scale_m / METRES_PER_DEGREE;
        let dx = dy / mid_lat.to_radians().cos().max(1e-6);
        let height = (lat_extent / dy).ceil().max(1.0) as usize;
        let width = (lon_extent / dx).ceil().max(1.0) as usize;
        Ok(Self {
            width,
            height,
            min_lon: bounds.min_lon,
            max_lon: bounds.min_lon + width as f64 * dx,
            min_lat: bounds.min_lat,
            max_lat: bounds.min_lat + height as f64 * dy,
        })
    }

    pub fn bounds(&self) -> Bounds {
        Bounds { min_lon: self.min_lon, max_lon: self.max_lon, min_lat: self.min_lat, max_lat: self.max_lat }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell size in degrees as `(dx, dy)`.
    pub fn cell_size_deg(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// Isotropic cell size in metres: mean of the two axes, longitude shrunk by
    /// cos(mid_lat). Falls back to 90 m when the extent is degenerate.
    pub fn cell_size_m(&self) -> f64 {
        let (dx, dy) = self.cell_size_deg();
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let cy = dy.abs() * METRES_PER_DEGREE;
        let cx = dx.abs() * METRES_PER_DEGREE * mid_lat.to_radians().cos();
        let avg = (cy + cx) / 2.0;
        if avg.is_finite() && avg >= 1e-3 { avg } else { 90.0 }
    }

    /// Cell containing `p`, or None outside the extent.
    pub fn cell_of(&self, p: LatLon) -> Option<(usize, usize)> {
        if self.is_empty() || !self.bounds().contains(p) {
            return None;
        }
        let (dx, dy) = self.cell_size_deg();
        let col = (((p.lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((p.lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let (dx, dy) = self.cell_size_deg();
        LatLon::new(self.min_lat + (row as f64 + 0.5) * dy, self.min_lon + (col as f64 + 0.5) * dx)
    }

    /// Cells whose centres fall in a `scale_m`-sided square centred on `p`,
    /// always including the cell containing `p`. None outside the extent.
    pub fn footprint(&self, p: LatLon, scale_m: f64) -> Option<Window> {
        let (row, col) = self.cell_of(p)?;
        let (dx, dy) = self.cell_size_deg();
        let half = scale_m.max(0.0) / 2.0;
        let half_lat = half / METRES_PER_DEGREE;
        let half_lon = half_lat / p.lat.to_radians().cos().max(1e-6);

        let span = |centre: f64, half: f64, origin: f64, step: f64, n: usize, own: usize| {
            let lo = ((centre - half - origin) / step - 0.5).ceil().max(0.0) as usize;
            let hi = ((centre + half - origin) / step - 0.5).floor();
            let hi = if hi < 0.0 { 0 } else { (hi as usize).min(n - 1) };
            (lo.min(own), hi.max(own))
        };
        let (row0, row1) = span(p.lat, half_lat, self.min_lat, dy, self.height, row);
        let (col0, col1) = span(p.lon, half_lon, self.min_lon, dx, self.width, col);
        Some(Window { row0, row1, col0, col1 })
    }
}

/// A single band of `f32` values over a `Grid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    /// Row-major values; `null` in JSON reads as NaN.
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub data: Vec<f32>,
    #[serde(flatten)]
    pub grid: Grid,
}

fn null_as_nan_vec<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Vec<f32>, D::Error> {
    let v: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn new(grid: Grid, fill: f32) -> Self {
        Self { data: vec![fill; grid.len()], grid }
    }

    pub fn from_data(grid: Grid, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(HazardError::InvalidConfig(format!(
                "raster has {} values, grid {}×{} needs {}",
                data.len(),
                grid.width,
                grid.height,
                grid.len()
            )));
        }
        Ok(Self { data, grid })
    }

    /// Read a raster from JSON (`data` + grid fields, `null` = no data) and
    /// check its length against the grid.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let r: Raster = serde_json::from_str(&text)?;
        Self::from_data(r.grid, r.data)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Value at `p`. Bilinear interpolation works between cell centres and
    /// falls back to the nearest cell when a neighbour is no-data.
    /// Returns None if `p` is outside the raster extent.
    pub fn sample(&self, p: LatLon, method: Resampling) -> Option<f32> {
        let (row, col) = self.grid.cell_of(p)?;
        let nearest = self.get(row, col);
        if method == Resampling::Nearest {
            return Some(nearest);
        }

        let (dx, dy) = self.grid.cell_size_deg();
        let max_x = (self.grid.width - 1) as f64;
        let max_y = (self.grid.height - 1) as f64;
        let fx = ((p.lon - self.grid.min_lon) / dx - 0.5).clamp(0.0, max_x);
        let fy = ((p.lat - self.grid.min_lat) / dy - 0.5).clamp(0.0, max_y);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.grid.width - 1);
        let y1 = (y0 + 1).min(self.grid.height - 1);

        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;

        let v00 = self.get(y0, x0);
        let v10 = self.get(y0, x1);
        let v01 = self.get(y1, x0);
        let v11 = self.get(y1, x1);

        let v = v00 * (1.0 - tx) * (1.0 - ty)
            + v10 * tx * (1.0 - ty)
            + v01 * (1.0 - tx) * ty
            + v11 * tx * ty;

        Some(if v.is_nan() { nearest } else { v })
    }

    /// Read this raster onto `target`, one sample per target cell centre.
    /// Target cells outside this raster's extent become NaN.
    pub fn resample_to(&self, target: &Grid, method: Resampling) -> Raster {
        if self.grid == *target {
            return self.clone();
        }
        let mut data = Vec::with_capacity(target.len());
        for r in 0..target.height {
            for c in 0..target.width {
                let v = self.sample(target.cell_center(r, c), method).unwrap_or(f32::NAN);
                data.push(v);
            }
        }
        Raster { data, grid: *target }
    }

    /// Finite values inside `window`.
    pub fn window_values(&self, window: Window) -> impl Iterator<Item = f32> + '_ {
        window.cells().map(move |(r, c)| self.get(r, c)).filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(n: usize) -> Grid {
        Grid::new(n, n, Bounds { min_lon: 0.0, max_lon: n as f64, min_lat: 0.0, max_lat: n as f64 })
    }

    #[test]
    fn cell_of_maps_sw_origin_and_edges() {
        let g = unit_grid(4);
        assert_eq!(g.cell_of(LatLon::new(0.1, 0.1)), Some((0, 0)));
        assert_eq!(g.cell_of(LatLon::new(3.9, 0.1)), Some((3, 0)));
        assert_eq!(g.cell_of(LatLon::new(4.0, 4.0)), Some((3, 3)));
        assert!(g.cell_of(LatLon::new(-0.1, 1.0)).is_none());
    }

    #[test]
    fn sample_at_cell_centres_returns_exact_values() {
        let mut r = Raster::new(unit_grid(4), 0.0);
        r.set(0, 0, 10.0);
        r.set(3, 3, 40.0);
        let c00 = r.grid.cell_center(0, 0);
        let c33 = r.grid.cell_center(3, 3);
        assert!((r.sample(c00, Resampling::Bilinear).unwrap() - 10.0).abs() < 1e-5);
        assert!((r.sample(c33, Resampling::Bilinear).unwrap() - 40.0).abs() < 1e-5);
    }

    #[test]
    fn bilinear_midpoint_averages_neighbours() {
        let mut r = Raster::new(unit_grid(2), 0.0);
        r.set(0, 1, 2.0);
        r.set(1, 1, 2.0);
        let v = r.sample(LatLon::new(1.0, 1.0), Resampling::Bilinear).unwrap();
        assert!((v - 1.0).abs() < 1e-5, "v={v}");
        let n = r.sample(LatLon::new(0.4, 0.4), Resampling::Nearest).unwrap();
        assert_eq!(n, 0.0);
    }

    #[test]
    fn bilinear_falls_back_to_nearest_next_to_nodata() {
        let mut r = Raster::new(unit_grid(2), 1.0);
        r.set(1, 1, f32::NAN);
        let v = r.sample(LatLon::new(0.9, 0.9), Resampling::Bilinear).unwrap();
        assert_eq!(v, 1.0);
    }

    #[test]
    fn resample_outside_source_is_nan() {
        let src = Raster::new(unit_grid(2), 5.0);
        let target = Grid::new(4, 1, Bounds { min_lon: 0.0, max_lon: 4.0, min_lat: 0.0, max_lat: 1.0 });
        let out = src.resample_to(&target, Resampling::Nearest);
        assert_eq!(out.data[0], 5.0);
        assert!(out.data[3].is_nan());
    }

    #[test]
    fn scale_grid_has_requested_cell_size() {
        let bounds = Bounds { min_lon: 85.0, max_lon: 85.1, min_lat: 0.0, max_lat: 0.1 };
        let g = Grid::from_bounds_and_scale(bounds, 90.0).unwrap();
        assert!((g.cell_size_m() - 90.0).abs() < 0.5, "cell={}", g.cell_size_m());
        assert!(g.max_lat >= bounds.max_lat && g.max_lon >= bounds.max_lon);
        assert!(Grid::from_bounds_and_scale(bounds, 0.0).is_err());
    }

    #[test]
    fn footprint_always_contains_own_cell() {
        let bounds = Bounds { min_lon: 0.0, max_lon: 0.01, min_lat: 0.0, max_lat: 0.01 };
        let g = Grid::from_bounds_and_scale(bounds, 30.0).unwrap();
        let p = LatLon::new(0.005, 0.005);
        let own = g.cell_of(p).unwrap();
        let w = g.footprint(p, 0.0).unwrap();
        assert_eq!((w.row0, w.row1, w.col0, w.col1), (own.0, own.0, own.1, own.1));
        let wide = g.footprint(p, 100.0).unwrap();
        assert!(wide.row1 - wide.row0 >= 2 && wide.col1 - wide.col0 >= 2);
    }

    #[test]
    fn json_nulls_read_as_nan() {
        let json = r#"{"data":[1.0,null],"width":2,"height":1,"min_lon":0.0,"max_lon":2.0,"min_lat":0.0,"max_lat":1.0}"#;
        let r: Raster = serde_json::from_str(json).unwrap();
        assert_eq!(r.data[0], 1.0);
        assert!(r.data[1].is_nan());
    }

    #[test]
    fn read_json_reports_io_json_and_shape_errors() {
        let dir = std::env::temp_dir().join(format!("hazard-core-raster-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        assert!(matches!(Raster::read_json(dir.join("absent.json")), Err(HazardError::Io(_))));

        let bad = dir.join("bad.json");
        fs::write(&bad, "{\"data\": [1.0,").unwrap();
        assert!(matches!(Raster::read_json(&bad), Err(HazardError::Json(_))));

        let short = dir.join("short.json");
        fs::write(&short, r#"{"data":[1.0],"width":2,"height":1,"min_lon":0,"max_lon":2,"min_lat":0,"max_lat":1}"#).unwrap();
        assert!(matches!(Raster::read_json(&short), Err(HazardError::InvalidConfig(_))));

        let ok = dir.join("ok.json");
        fs::write(&ok, r#"{"data":[1.0,null],"width":2,"height":1,"min_lon":0,"max_lon":2,"min_lat":0,"max_lat":1}"#).unwrap();
        let r = Raster::read_json(&ok).unwrap();
        assert_eq!(r.get(0, 0), 1.0);
        assert!(r.get(0, 1).is_nan());

        fs::remove_dir_all(&dir).ok();
    }
}
