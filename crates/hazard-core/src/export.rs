//! Persistence of run artifacts.
//!
//! Each artifact is exported on its own; a failure is reported for that
//! artifact only and never touches the in-memory results, so a failed export
//! can simply be retried.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::{info, warn};

use crate::classifier::Explanation;
use crate::error::{HazardError, Result};
use crate::raster::Grid;
use crate::roc::RocTable;
use crate::surface::HazardRaster;

/// Artifact names derived from the run name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub hazard_map: String,
    pub model: String,
    pub roc: String,
}

impl ArtifactNames {
    pub fn for_run(run: &str) -> Self {
        Self {
            hazard_map: format!("{run}_hazard_map"),
            model: format!("{run}_hazard_map_model"),
            roc: format!("{run}_hazard_map_ROC"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ArtifactPayload<'a> {
    HazardRaster(&'a HazardRaster),
    Diagnostics(&'a Explanation),
    Roc(&'a RocTable),
}

#[derive(Debug, Clone)]
pub struct Artifact<'a> {
    pub name: String,
    pub payload: ArtifactPayload<'a>,
}

/// Destination for run artifacts.
pub trait ExportSink {
    fn export(&self, artifact: &Artifact<'_>) -> Result<()>;
}

/// Per-artifact outcome of an export pass.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub exported: Vec<String>,
    pub failed: Vec<HazardError>,
    /// Artifacts that could not be produced (e.g. ROC after a failed evaluation).
    pub skipped: Vec<String>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Export every artifact independently, collecting failures.
pub fn export_artifacts(sink: &dyn ExportSink, artifacts: &[Artifact<'_>]) -> ExportReport {
    let mut report = ExportReport::default();
    for artifact in artifacts {
        match sink.export(artifact) {
            Ok(()) => {
                info!(artifact = %artifact.name, "artifact exported");
                report.exported.push(artifact.name.clone());
            }
            Err(e) => {
                warn!(artifact = %artifact.name, error = %e, "artifact export failed");
                report.failed.push(e);
            }
        }
    }
    report
}

fn export_err(artifact: &str, reason: impl ToString) -> HazardError {
    HazardError::Export { artifact: artifact.to_string(), reason: reason.to_string() }
}

/// Georeference written next to the hazard TIFF.
#[derive(Serialize)]
struct RasterSidecar<'a> {
    #[serde(flatten)]
    grid: &'a Grid,
    crs: &'static str,
    nodata: u8,
    scale: &'static str,
}

#[derive(Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: f64,
}

/// Writes artifacts into one directory:
/// `<name>.tif` + `<name>.json` for the hazard raster, `<name>.csv` for tables.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_raster(&self, name: &str, raster: &HazardRaster) -> std::result::Result<(), String> {
        let grid = &raster.grid;
        // TIFF rows run north to south.
        let mut north_up = Vec::with_capacity(raster.data.len());
        for r in (0..grid.height).rev() {
            north_up.extend_from_slice(&raster.data[r * grid.width..(r + 1) * grid.width]);
        }

        let path = self.root.join(format!("{name}.tif"));
        let file = fs::File::create(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(|e| e.to_string())?;
        encoder
            .write_image::<colortype::Gray8>(grid.width as u32, grid.height as u32, &north_up)
            .map_err(|e| e.to_string())?;

        let sidecar = RasterSidecar { grid, crs: "EPSG:4326", nodata: HazardRaster::NODATA, scale: "probability x 100" };
        let json = serde_json::to_string_pretty(&sidecar).map_err(|e| e.to_string())?;
        let meta = self.root.join(format!("{name}.json"));
        fs::write(&meta, json).map_err(|e| format!("{}: {e}", meta.display()))
    }

    fn write_csv<T: Serialize>(&self, name: &str, rows: impl IntoIterator<Item = T>) -> std::result::Result<(), String> {
        let path = self.root.join(format!("{name}.csv"));
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        for row in rows {
            wtr.serialize(row).map_err(|e| e.to_string())?;
        }
        wtr.flush().map_err(|e| e.to_string())
    }
}

impl ExportSink for DirectorySink {
    fn export(&self, artifact: &Artifact<'_>) -> Result<()> {
        let name = artifact.name.as_str();
        fs::create_dir_all(&self.root).map_err(|e| export_err(name, e))?;
        let written = match artifact.payload {
            ArtifactPayload::HazardRaster(r) => self.write_raster(name, r),
            ArtifactPayload::Diagnostics(e) => {
                let rows = e.rows();
                self.write_csv(name, rows.iter().map(|(key, value)| KeyValue { key, value: *value }))
            }
            ArtifactPayload::Roc(t) => self.write_csv(name, t.points().iter()),
        };
        written.map_err(|reason| export_err(name, reason))
    }
}

/// Owned copy of an exported artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredArtifact {
    HazardRaster(HazardRaster),
    Diagnostics(Explanation),
    Roc(RocTable),
}

/// Keeps exported artifacts in memory, keyed by name. Re-exporting a name
/// replaces the earlier copy.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(String, StoredArtifact)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<StoredArtifact> {
        let stored = self.stored.lock().ok()?;
        stored.iter().find(|(n, _)| n == name).map(|(_, a)| a.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.stored
            .lock()
            .map(|s| s.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }
}

impl ExportSink for MemorySink {
    fn export(&self, artifact: &Artifact<'_>) -> Result<()> {
        let owned = match artifact.payload {
            ArtifactPayload::HazardRaster(r) => StoredArtifact::HazardRaster(r.clone()),
            ArtifactPayload::Diagnostics(e) => StoredArtifact::Diagnostics(e.clone()),
            ArtifactPayload::Roc(t) => StoredArtifact::Roc(t.clone()),
        };
        let mut stored = self.stored.lock().map_err(|e| export_err(&artifact.name, e))?;
        stored.retain(|(n, _)| *n != artifact.name);
        stored.push((artifact.name.clone(), owned));
        Ok(())
    }
}
