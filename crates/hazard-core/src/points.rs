use serde::{Deserialize, Serialize};

use crate::coords::LatLon;

/// Binary inventory label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Hazard occurred here (1).
    Event,
    /// No hazard recorded (0).
    NonEvent,
}

impl Label {
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Event => 1,
            Label::NonEvent => 0,
        }
    }
}

/// A location from the event or non-event inventory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub location: LatLon,
    pub label: Label,
}

impl LabeledPoint {
    pub fn new(location: LatLon, label: Label) -> Self {
        Self { location, label }
    }

    pub fn event(lat: f64, lon: f64) -> Self {
        Self::new(LatLon::new(lat, lon), Label::Event)
    }

    pub fn non_event(lat: f64, lon: f64) -> Self {
        Self::new(LatLon::new(lat, lon), Label::NonEvent)
    }
}

/// Label every location of an inventory with the same class.
pub fn label_all(locations: &[LatLon], label: Label) -> Vec<LabeledPoint> {
    locations.iter().map(|&l| LabeledPoint::new(l, label)).collect()
}
