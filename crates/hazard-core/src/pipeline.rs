//! Pipeline orchestrator: stack → split → sample → train → predict →
//! evaluate, then export on request.

use tracing::{info, warn};

use crate::classifier::{Explanation, ProbabilisticClassifier, RandomForest, RandomForestModel, TrainedClassifier};
use crate::config::RunConfig;
use crate::coords::{Boundary, LatLon};
use crate::error::{HazardError, Result};
use crate::export::{export_artifacts, Artifact, ArtifactNames, ArtifactPayload, ExportReport, ExportSink};
use crate::points::{label_all, Label};
use crate::raster::Grid;
use crate::roc::{evaluate, RocEvaluation};
use crate::sampler::sample_points;
use crate::split::{split_samples, SampleSplit};
use crate::stack::{Covariate, FeatureStack, FeatureStackBuilder};
use crate::surface::{HazardRaster, ProbabilitySurface};

// ── Inputs and outputs ────────────────────────────────────────────────────────

/// Everything a run needs besides the configuration and the learner.
#[derive(Debug, Clone)]
pub struct RunInputs {
    /// Prefix of every artifact name.
    pub name: String,
    pub events: Vec<LatLon>,
    pub non_events: Vec<LatLon>,
    /// Covariates in band order.
    pub covariates: Vec<Covariate>,
    /// Study area; its bounding box defines the reference grid.
    pub boundary: Boundary,
}

/// Full output of one run.
///
/// `evaluation` is kept as a `Result`: a run whose held-out data cannot be
/// scored still carries a valid model and surface.
#[derive(Debug)]
pub struct HazardRun<M> {
    pub name: String,
    pub stack: FeatureStack,
    pub split: SampleSplit,
    pub training_rows: usize,
    pub dropped_outside: usize,
    pub dropped_nodata: usize,
    pub model: M,
    pub explanation: Explanation,
    pub surface: ProbabilitySurface,
    pub hazard: HazardRaster,
    pub evaluation: Result<RocEvaluation>,
}

impl<M> HazardRun<M> {
    pub fn artifact_names(&self) -> ArtifactNames {
        ArtifactNames::for_run(&self.name)
    }

    /// Artifacts that can be produced, plus the names of those that cannot.
    fn artifacts(&self) -> (Vec<Artifact<'_>>, Vec<String>) {
        let names = self.artifact_names();
        let mut artifacts = vec![
            Artifact { name: names.hazard_map, payload: ArtifactPayload::HazardRaster(&self.hazard) },
            Artifact { name: names.model, payload: ArtifactPayload::Diagnostics(&self.explanation) },
        ];
        let mut skipped = Vec::new();
        match &self.evaluation {
            Ok(e) => artifacts.push(Artifact { name: names.roc, payload: ArtifactPayload::Roc(&e.table) }),
            Err(_) => skipped.push(names.roc),
        }
        (artifacts, skipped)
    }

    /// Re-export one artifact by name, e.g. after a failed export.
    pub fn export_artifact(&self, name: &str, sink: &dyn ExportSink) -> Result<()> {
        let (artifacts, skipped) = self.artifacts();
        if let Some(a) = artifacts.iter().find(|a| a.name == name) {
            return sink.export(a);
        }
        let reason = if skipped.iter().any(|s| s == name) {
            "evaluation failed, nothing to export".to_string()
        } else {
            "unknown artifact".to_string()
        };
        Err(HazardError::Export { artifact: name.to_string(), reason })
    }
}

/// Export every artifact of `run` independently.
pub fn export_run<M>(run: &HazardRun<M>, sink: &dyn ExportSink) -> ExportReport {
    let (artifacts, skipped) = run.artifacts();
    let mut report = export_artifacts(sink, &artifacts);
    for name in skipped {
        warn!(artifact = %name, "artifact skipped");
        report.skipped.push(name);
    }
    report
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs all stages for a validated configuration.
#[derive(Debug, Clone)]
pub struct HazardPipeline {
    config: RunConfig,
}

impl HazardPipeline {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run with the bundled random forest, seeded from the run seed.
    pub fn run_forest(&self, inputs: &RunInputs) -> Result<HazardRun<RandomForestModel>> {
        let forest = RandomForest::new(self.config.forest.clone(), self.config.seed);
        self.run(inputs, &forest)
    }

    /// Run the full pipeline with `classifier`.
    ///
    /// Stage order:
    ///   1. Feature stack on the boundary grid
    ///   2. Train/test split
    ///   3. Training table
    ///   4. Training
    ///   5. Prediction and hazard raster
    ///   6. Evaluation on the held-out points
    ///
    /// Failures in stages 1-5 abort the run. A failed evaluation is stored in
    /// the result.
    pub fn run<C: ProbabilisticClassifier>(&self, inputs: &RunInputs, classifier: &C) -> Result<HazardRun<C::Model>> {
        let cfg = &self.config;
        info!(run = %inputs.name, events = inputs.events.len(), non_events = inputs.non_events.len(), "run started");

        // ── 1. Feature stack ────────────────────────────────────────────────
        let bounds = inputs
            .boundary
            .bounds()
            .ok_or_else(|| HazardError::InvalidConfig("boundary needs at least three vertices".into()))?;
        let grid = Grid::from_bounds_and_scale(bounds, cfg.stack_scale_m)?;
        let builder = FeatureStackBuilder::new(grid, cfg.resampling).extend(inputs.covariates.iter().cloned());
        let stack = match &cfg.bands {
            Some(bands) => builder.build(bands)?,
            None => builder.build_all()?,
        };

        // ── 2. Split ────────────────────────────────────────────────────────
        let events = label_all(&inputs.events, Label::Event);
        let non_events = label_all(&inputs.non_events, Label::NonEvent);
        let split = split_samples(&events, &non_events, cfg.split_fraction, cfg.seed)?;

        // ── 3. Training table ───────────────────────────────────────────────
        let sampled = sample_points(
            &stack,
            &split.training_points(),
            cfg.sampling_scale_m,
            &cfg.label_column,
            cfg.out_of_extent,
        )?;

        // ── 4. Training ─────────────────────────────────────────────────────
        let features = stack.band_names();
        let model = classifier.train(&sampled.table, &cfg.label_column, &features)?;
        let explanation = model.explain();

        // ── 5. Prediction ───────────────────────────────────────────────────
        let surface = model.predict_probability(&stack)?;
        let hazard = HazardRaster::from_surface(&surface, &inputs.boundary, cfg.export_scale_m, cfg.resampling)?;

        // ── 6. Evaluation ───────────────────────────────────────────────────
        let evaluation = evaluate(
            &surface,
            &split.events.test,
            &split.non_events.test,
            &cfg.roc,
            cfg.evaluation_scale_m,
        );
        if let Err(e) = &evaluation {
            warn!(error = %e, "evaluation failed; surface is still exportable");
        }

        Ok(HazardRun {
            name: inputs.name.clone(),
            stack,
            split,
            training_rows: sampled.table.len(),
            dropped_outside: sampled.dropped_outside,
            dropped_nodata: sampled.dropped_nodata,
            model,
            explanation,
            surface,
            hazard,
            evaluation,
        })
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
