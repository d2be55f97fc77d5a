//! Point sampling of a feature stack into a flat training table.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HazardError, Result};
use crate::points::LabeledPoint;
use crate::stack::FeatureStack;

/// What to do with points that fall outside the stack extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfExtentPolicy {
    /// Drop them and log a warning with the count.
    #[default]
    Warn,
    /// Fail with `PointsOutsideExtent`.
    Error,
}

/// One sampled point: feature values in column order plus its 0/1 label.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub features: Vec<f64>,
    pub label: u8,
}

/// Feature/label rows. Column order equals the stack's band order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub columns: Vec<String>,
    pub label_column: String,
    pub rows: Vec<TableRow>,
}

impl TrainingTable {
    pub fn new(columns: Vec<String>, label_column: impl Into<String>) -> Self {
        Self { columns, label_column: label_column.into(), rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows labelled as events.
    pub fn event_count(&self) -> usize {
        self.rows.iter().filter(|r| r.label == 1).count()
    }
}

/// Result of sampling a point set.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub table: TrainingTable,
    /// Points outside the stack extent.
    pub dropped_outside: usize,
    /// Points whose footprint had no finite value in some band.
    pub dropped_nodata: usize,
}

/// Sample every band at each point, averaging the finite cells of a
/// `scale_m`-sided footprint around it.
///
/// `scale_m` should match the resolution the model is later applied at; a
/// mismatch is not detected here.
pub fn sample_points(
    stack: &FeatureStack,
    points: &[LabeledPoint],
    scale_m: f64,
    label_column: &str,
    policy: OutOfExtentPolicy,
) -> Result<SampleOutcome> {
    let grid = stack.grid();
    let mut table = TrainingTable::new(stack.band_names(), label_column);
    let mut dropped_outside = 0usize;
    let mut dropped_nodata = 0usize;

    'points: for p in points {
        let Some(window) = grid.footprint(p.location, scale_m) else {
            dropped_outside += 1;
            continue;
        };
        let mut features = Vec::with_capacity(stack.band_count());
        for b in 0..stack.band_count() {
            let (sum, n) = window
                .cells()
                .map(|(r, c)| stack.get(b, r, c))
                .filter(|v| v.is_finite())
                .fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
            if n == 0 {
                dropped_nodata += 1;
                continue 'points;
            }
            features.push(sum / n as f64);
        }
        table.rows.push(TableRow { features, label: p.label.as_u8() });
    }

    if dropped_outside > 0 {
        match policy {
            OutOfExtentPolicy::Warn => {
                warn!(dropped = dropped_outside, "points outside the feature stack extent were dropped")
            }
            OutOfExtentPolicy::Error => {
                return Err(HazardError::PointsOutsideExtent { dropped: dropped_outside })
            }
        }
    }
    if dropped_nodata > 0 {
        warn!(dropped = dropped_nodata, "points with no-data features were dropped");
    }
    info!(rows = table.len(), events = table.event_count(), scale_m, "training table sampled");

    Ok(SampleOutcome { table, dropped_outside, dropped_nodata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Bounds;
    use crate::points::LabeledPoint;
    use crate::raster::{Grid, Raster, Resampling};
    use crate::stack::{Covariate, FeatureStackBuilder};

    /// 10×10 grid of ~90 m cells; band "col" holds the column index and band
    /// "row" the row index.
    fn index_stack() -> FeatureStack {
        let d = 90.0 / 111_320.0;
        let grid = Grid::new(10, 10, Bounds { min_lon: 0.0, max_lon: 10.0 * d, min_lat: 0.0, max_lat: 10.0 * d });
        let mut col = Raster::new(grid, 0.0);
        let mut row = Raster::new(grid, 0.0);
        for r in 0..10 {
            for c in 0..10 {
                col.set(r, c, c as f32);
                row.set(r, c, r as f32);
            }
        }
        FeatureStackBuilder::new(grid, Resampling::Nearest)
            .add(Covariate::raster("col", col))
            .add(Covariate::raster("row", row))
            .build_all()
            .unwrap()
    }

    fn centre_of(stack: &FeatureStack, r: usize, c: usize) -> (f64, f64) {
        let p = stack.grid().cell_center(r, c);
        (p.lat, p.lon)
    }

    #[test]
    fn rows_follow_band_order_and_labels() {
        let stack = index_stack();
        let (lat, lon) = centre_of(&stack, 3, 7);
        let (lat2, lon2) = centre_of(&stack, 5, 1);
        let points = [LabeledPoint::event(lat, lon), LabeledPoint::non_event(lat2, lon2)];
        let out = sample_points(&stack, &points, 0.0, "slide", OutOfExtentPolicy::Warn).unwrap();

        assert_eq!(out.table.columns, vec!["col", "row"]);
        assert_eq!(out.table.label_column, "slide");
        assert_eq!(out.table.rows[0], TableRow { features: vec![7.0, 3.0], label: 1 });
        assert_eq!(out.table.rows[1], TableRow { features: vec![1.0, 5.0], label: 0 });
    }

    #[test]
    fn footprint_averages_neighbouring_cells() {
        let stack = index_stack();
        let (lat, lon) = centre_of(&stack, 4, 4);
        // 270 m covers the 3×3 block around the centre cell.
        let out = sample_points(&stack, &[LabeledPoint::event(lat, lon)], 270.0, "slide", OutOfExtentPolicy::Warn)
            .unwrap();
        let f = &out.table.rows[0].features;
        assert!((f[0] - 4.0).abs() < 1e-9 && (f[1] - 4.0).abs() < 1e-9, "{f:?}");
    }

    #[test]
    fn outside_points_are_dropped_and_counted() {
        let stack = index_stack();
        let (lat, lon) = centre_of(&stack, 0, 0);
        let points = [
            LabeledPoint::event(lat, lon),
            LabeledPoint::event(1.0, 1.0),
            LabeledPoint::non_event(-1.0, 0.0),
        ];
        let out = sample_points(&stack, &points, 90.0, "slide", OutOfExtentPolicy::Warn).unwrap();
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.dropped_outside, 2);

        let err = sample_points(&stack, &points, 90.0, "slide", OutOfExtentPolicy::Error).unwrap_err();
        assert!(matches!(err, HazardError::PointsOutsideExtent { dropped: 2 }));
    }

    #[test]
    fn nodata_footprints_are_dropped() {
        let d = 90.0 / 111_320.0;
        let grid = Grid::new(2, 1, Bounds { min_lon: 0.0, max_lon: 2.0 * d, min_lat: 0.0, max_lat: d });
        let mut band = Raster::new(grid, 1.0);
        band.set(0, 1, f32::NAN);
        let stack = FeatureStackBuilder::new(grid, Resampling::Nearest)
            .add(Covariate::raster("b", band))
            .build_all()
            .unwrap();
        let p = grid.cell_center(0, 1);
        let out = sample_points(&stack, &[LabeledPoint::event(p.lat, p.lon)], 0.0, "slide", OutOfExtentPolicy::Warn)
            .unwrap();
        assert!(out.table.is_empty());
        assert_eq!(out.dropped_nodata, 1);
    }
}
