//! Error taxonomy shared by every pipeline stage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HazardError {
    /// A declared band (or model feature) has no matching covariate source.
    #[error("missing covariate: no source for band `{band}`")]
    MissingCovariate { band: String },

    #[error("duplicate band name `{band}` in feature stack")]
    DuplicateBand { band: String },

    /// A class pool is empty where at least one point is required.
    #[error("insufficient evaluation data: {reason}")]
    InsufficientEvaluationData { reason: String },

    #[error("{dropped} point(s) fall outside the feature stack extent")]
    PointsOutsideExtent { dropped: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persistence of one artifact failed; in-memory results are unaffected.
    #[error("export of `{artifact}` failed: {reason}")]
    Export { artifact: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HazardError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientEvaluationData { reason: reason.into() }
    }

    pub(crate) fn missing(band: impl Into<String>) -> Self {
        Self::MissingCovariate { band: band.into() }
    }
}

pub type Result<T> = std::result::Result<T, HazardError>;
