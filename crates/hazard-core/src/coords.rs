/// Geographic coordinate types and the study-area boundary.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// A point on the WGS84 ellipsoid in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn contains(&self, p: LatLon) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }
}

/// Study-area outline: a single closed ring of vertices (closing vertex optional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub ring: Vec<LatLon>,
}

impl Boundary {
    pub fn new(ring: Vec<LatLon>) -> Self {
        Self { ring }
    }

    /// Rectangle boundary covering `bounds`.
    pub fn from_bounds(b: Bounds) -> Self {
        Self::new(vec![
            LatLon::new(b.min_lat, b.min_lon),
            LatLon::new(b.min_lat, b.max_lon),
            LatLon::new(b.max_lat, b.max_lon),
            LatLon::new(b.max_lat, b.min_lon),
        ])
    }

    /// Bounding box of the ring, or None for fewer than three vertices.
    pub fn bounds(&self) -> Option<Bounds> {
        if self.ring.len() < 3 {
            return None;
        }
        let mut b = Bounds {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for p in &self.ring {
            b.min_lon = b.min_lon.min(p.lon);
            b.max_lon = b.max_lon.max(p.lon);
            b.min_lat = b.min_lat.min(p.lat);
            b.max_lat = b.max_lat.max(p.lat);
        }
        Some(b)
    }

    /// Even-odd ray casting. Points exactly on an edge may land either side.
    pub fn contains(&self, p: LatLon) -> bool {
        let n = self.ring.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.ring[i];
            let b = self.ring[j];
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let x = (b.lon - a.lon) * (p.lat - a.lat) / (b.lat - a.lat) + a.lon;
                if p.lon < x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Boundary {
        Boundary::new(vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 10.0),
            LatLon::new(10.0, 0.0),
        ])
    }

    #[test]
    fn triangle_contains_interior_not_hypotenuse_side() {
        let b = triangle();
        assert!(b.contains(LatLon::new(2.0, 2.0)));
        assert!(!b.contains(LatLon::new(8.0, 8.0)));
        assert!(!b.contains(LatLon::new(-1.0, 5.0)));
    }

    #[test]
    fn bounds_of_ring() {
        let b = triangle().bounds().unwrap();
        assert_eq!((b.min_lon, b.max_lon, b.min_lat, b.max_lat), (0.0, 10.0, 0.0, 10.0));
        assert!(Boundary::new(vec![LatLon::new(0.0, 0.0)]).bounds().is_none());
    }

    #[test]
    fn rectangle_boundary_matches_bounds() {
        let bounds = Bounds { min_lon: 85.0, max_lon: 86.0, min_lat: 27.0, max_lat: 28.0 };
        let b = Boundary::from_bounds(bounds);
        assert!(b.contains(LatLon::new(27.5, 85.5)));
        assert!(!b.contains(LatLon::new(28.5, 85.5)));
        assert_eq!(b.bounds(), Some(bounds));
    }
}
