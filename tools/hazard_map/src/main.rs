/// Landslide hazard map tool: reads a JSON run manifest, trains a random
/// forest on the labeled inventory, evaluates it on the held-out points and
/// writes the hazard raster, model diagnostics and ROC table.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hazard_core::{
    export_run, Boundary, Covariate, DirectorySink, HazardPipeline, LatLon, Raster, Reduction, RunConfig, RunInputs,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hazard_map", about = "Train, evaluate and export a landslide hazard map")]
struct Args {
    /// Run manifest (JSON)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Run configuration (JSON); overrides the manifest's `config` entry
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for artifacts (created if absent)
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Override the run seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the training fraction of each class pool
    #[arg(long)]
    split: Option<f64>,

    /// Override the number of ROC cutoffs
    #[arg(long)]
    steps: Option<usize>,
}

// ── JSON schema for the manifest ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HazardManifest {
    /// Prefix for artifact names.
    name: String,
    /// JSON array of `{lat, lon}`.
    events: PathBuf,
    non_events: PathBuf,
    boundary: Vec<LatLon>,
    covariates: Vec<CovariateEntry>,
    /// Model bands in order; overrides the configuration's `bands`.
    #[serde(default)]
    bands: Option<Vec<String>>,
    #[serde(default)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CovariateKind {
    Raster,
    Series,
    Slope,
}

#[derive(Debug, Deserialize)]
struct CovariateEntry {
    band: String,
    kind: CovariateKind,
    /// Raster JSON files; exactly one except for `series`.
    rasters: Vec<PathBuf>,
    #[serde(default)]
    reduction: Option<Reduction>,
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Relative paths in the manifest resolve against its directory.
fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_raster(path: &Path) -> Result<Raster> {
    Raster::read_json(path).with_context(|| format!("Bad raster {}", path.display()))
}

fn load_covariate(base: &Path, entry: &CovariateEntry) -> Result<Covariate> {
    let mut rasters = entry
        .rasters
        .iter()
        .map(|p| load_raster(&resolve(base, p)))
        .collect::<Result<Vec<_>>>()?;

    match entry.kind {
        CovariateKind::Series => {
            if rasters.is_empty() {
                bail!("Covariate `{}`: series needs at least one raster", entry.band);
            }
            Ok(Covariate::series(&entry.band, rasters, entry.reduction.unwrap_or(Reduction::Mean)))
        }
        CovariateKind::Raster | CovariateKind::Slope => {
            if entry.reduction.is_some() {
                bail!("Covariate `{}`: reduction only applies to series", entry.band);
            }
            if rasters.len() != 1 {
                bail!("Covariate `{}`: expected one raster, got {}", entry.band, rasters.len());
            }
            let r = rasters.remove(0);
            Ok(match entry.kind {
                CovariateKind::Slope => Covariate::slope(&entry.band, r),
                _ => Covariate::raster(&entry.band, r),
            })
        }
    }
}

fn load_config(args: &Args, manifest: &HazardManifest, base: &Path) -> Result<RunConfig> {
    let path = args.config.clone().or_else(|| manifest.config.as_ref().map(|p| resolve(base, p)));
    let mut config = match path {
        Some(p) => RunConfig::read_json(&p).with_context(|| format!("Bad config {}", p.display()))?,
        None => RunConfig::default(),
    };
    if let Some(bands) = &manifest.bands {
        config.bands = Some(bands.clone());
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(split) = args.split {
        config.split_fraction = split;
    }
    if let Some(steps) = args.steps {
        config.roc.steps = steps;
    }
    Ok(config)
}

fn load_inputs(manifest: &HazardManifest, base: &Path) -> Result<RunInputs> {
    let events: Vec<LatLon> = read_json(&resolve(base, &manifest.events))?;
    let non_events: Vec<LatLon> = read_json(&resolve(base, &manifest.non_events))?;
    let covariates = manifest
        .covariates
        .iter()
        .map(|c| load_covariate(base, c))
        .collect::<Result<Vec<_>>>()?;
    Ok(RunInputs {
        name: manifest.name.clone(),
        events,
        non_events,
        covariates,
        boundary: Boundary::new(manifest.boundary.clone()),
    })
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let manifest: HazardManifest = read_json(&args.manifest)?;
    let base = args.manifest.parent().map(Path::to_path_buf).unwrap_or_default();

    let config = load_config(&args, &manifest, &base)?;
    let inputs = load_inputs(&manifest, &base)?;
    let pipeline = HazardPipeline::new(config).context("Invalid run configuration")?;
    info!(seed = pipeline.config().seed, split = pipeline.config().split_fraction, "configuration loaded");
    let run = pipeline.run_forest(&inputs).with_context(|| format!("Run `{}` failed", inputs.name))?;
    if let Some(top) = run.model.ranked_features().first() {
        info!(feature = %top.name, importance = top.importance, oob_error = run.model.oob_score().error, "model trained");
    }

    match &run.evaluation {
        Ok(e) => info!(auc = e.auc, best_cutoff = e.best.cutoff, "evaluation"),
        Err(e) => warn!(error = %e, "no evaluation; ROC table will not be written"),
    }

    let sink = DirectorySink::new(&args.output);
    let report = export_run(&run, &sink);
    info!(
        exported = report.exported.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        output = %sink.root().display(),
        "export finished"
    );
    if let Some(first) = report.failed.into_iter().next() {
        return Err(first).context("Artifact export failed");
    }
    Ok(())
}
