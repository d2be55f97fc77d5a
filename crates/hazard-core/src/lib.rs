//! Landslide hazard susceptibility: covariate stacking, seeded sample
//! splitting, point sampling, probabilistic classification, ROC evaluation
//! and artifact export.

pub mod classifier;
pub mod config;
pub mod coords;
pub mod error;
pub mod export;
pub(crate) mod par;
pub mod pipeline;
pub mod points;
pub mod raster;
pub mod roc;
pub mod sampler;
pub mod split;
pub mod stack;
pub mod surface;

pub use classifier::{Explanation, ProbabilisticClassifier, RandomForest, TrainedClassifier};
pub use config::RunConfig;
pub use coords::{Boundary, Bounds, LatLon};
pub use error::{HazardError, Result};
pub use export::{DirectorySink, ExportReport, ExportSink, MemorySink};
pub use pipeline::{export_run, HazardPipeline, HazardRun, RunInputs};
pub use raster::{Grid, Raster, Resampling};
pub use stack::{Covariate, FeatureStack, FeatureStackBuilder, Reduction};
