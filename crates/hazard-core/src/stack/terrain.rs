//! Terrain derivatives computed from an elevation covariate.
//!
//! Slope uses Horn's (1981) 3×3 weighted finite-difference gradient:
//!   dz/dx = ((NE + 2·E + SE) − (NW + 2·W + SW)) / (8 · cellsize)
//!   dz/dy = ((NW + 2·N + NE) − (SW + 2·S + SE)) / (8 · cellsize)
//!   slope  = atan(√(dz_dx² + dz_dy²)) × 180/π
//!
//! Edge cells replicate their nearest interior neighbour so the output keeps
//! the input grid. Any no-data cell in the 3×3 window yields NaN.

use crate::raster::Raster;

/// Horn gradient at `(r, c)` with clamped neighbour indices.
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run.
fn horn_gradient(dem: &Raster, r: usize, c: usize, cellsize: f64) -> (f64, f64) {
    let last_r = dem.grid.height - 1;
    let last_c = dem.grid.width - 1;
    let at = |dr: isize, dc: isize| {
        let rr = (r as isize + dr).clamp(0, last_r as isize) as usize;
        let cc = (c as isize + dc).clamp(0, last_c as isize) as usize;
        dem.get(rr, cc) as f64
    };

    let nw = at(1, -1);
    let n = at(1, 0);
    let ne = at(1, 1);
    let w = at(0, -1);
    let e = at(0, 1);
    let sw = at(-1, -1);
    let s = at(-1, 0);
    let se = at(-1, 1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cellsize);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cellsize);
    (dz_dx, dz_dy)
}

/// Slope in degrees for every cell of `dem` (elevation in metres).
pub fn slope_degrees(dem: &Raster) -> Raster {
    let mut out = Raster::new(dem.grid, f32::NAN);
    if dem.grid.is_empty() {
        return out;
    }
    let cellsize = dem.grid.cell_size_m();
    for r in 0..dem.grid.height {
        for c in 0..dem.grid.width {
            let (dz_dx, dz_dy) = horn_gradient(dem, r, c, cellsize);
            let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            out.set(r, c, slope_rad.to_degrees() as f32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Bounds;
    use crate::raster::Grid;

    /// Planar ramp rising along longitude at `target_deg`, with ≈90 m pixels
    /// at the equator.
    fn make_ramp(n: usize, target_deg: f64) -> Raster {
        let pixel_deg = 90.0 / 111_320.0;
        let extent = n as f64 * pixel_deg;
        let grid = Grid::new(n, n, Bounds { min_lon: 0.0, max_lon: extent, min_lat: 0.0, max_lat: extent });
        let cellsize = grid.cell_size_m();
        let rise_per_cell = cellsize * target_deg.to_radians().tan();

        let mut dem = Raster::new(grid, 0.0);
        for r in 0..n {
            for c in 0..n {
                dem.set(r, c, (c as f64 * rise_per_cell) as f32);
            }
        }
        dem
    }

    #[test]
    fn ramp_interior_matches_target_slope() {
        let dem = make_ramp(16, 10.0);
        let slope = slope_degrees(&dem);
        for r in 1..15 {
            for c in 1..15 {
                let s = slope.get(r, c);
                assert!((s - 10.0).abs() < 0.1, "slope({r},{c}) = {s}");
            }
        }
    }

    #[test]
    fn flat_field_has_zero_slope_everywhere() {
        let dem = Raster::new(make_ramp(8, 0.0).grid, 250.0);
        let slope = slope_degrees(&dem);
        assert!(slope.data.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn nodata_neighbour_propagates() {
        let mut dem = make_ramp(8, 5.0);
        dem.set(4, 4, f32::NAN);
        let slope = slope_degrees(&dem);
        assert!(slope.get(4, 5).is_nan());
        assert!(slope.get(0, 0).is_finite());
    }
}
