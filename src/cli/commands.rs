//! CLI Command Implementations
//!
//! The batch runner behind `stemeval evaluate`: load, separate, score and
//! optionally write WAVs for each track, isolating failures per track.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use log::{error, info, warn};

use crate::cli::EvaluateArgs;
use crate::config::{PipelineConfig, PsdUpdate};
use crate::dataset::{MusdbDirectory, TrackProvider};
use crate::engine::{export_audio, ExportFormat};
use crate::error::Result;
use crate::eval::{EvaluationReport, Scorer, VariantScores, WindowedSdrScorer, SKIP_EVAL_NOTE};
use crate::pipeline::{SeparationPipeline, TrackEstimates};

/// Knobs of a batch run that sit outside the per-track pipeline
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Tracks to process; 0 = all
    pub max_tracks: usize,
    pub skip_eval: bool,
    /// Write estimate WAVs under this directory when set
    pub wav_dir: Option<PathBuf>,
}

/// Runs the pipeline over every track of a provider
pub struct BatchRunner<'a> {
    pipeline: &'a SeparationPipeline,
    scorer: &'a dyn Scorer,
    options: BatchOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(pipeline: &'a SeparationPipeline, scorer: &'a dyn Scorer, options: BatchOptions) -> Self {
        Self {
            pipeline,
            scorer,
            options,
            cancel: None,
        }
    }

    /// Stop before the next track once `flag` is set
    ///
    /// Library hook for embedding callers; the `stemeval` binary runs
    /// without one and is interrupted by the process signal instead.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Process tracks in provider order and collect the report
    ///
    /// Only listing the tracks can fail; a failing track becomes a note.
    pub fn run(&self, provider: &dyn TrackProvider) -> Result<EvaluationReport> {
        let names = provider.track_names()?;
        let limit = match self.options.max_tracks {
            0 => names.len(),
            n => n.min(names.len()),
        };
        info!("Processing {} of {} track(s)", limit, names.len());

        let mut report = EvaluationReport::new();
        for (index, name) in names.iter().take(limit).enumerate() {
            if self.is_cancelled() {
                warn!("Cancelled; {} track(s) left unprocessed", limit - index);
                break;
            }

            match self.run_track(provider, name) {
                Ok(Some(scores)) => {
                    for (variant, metrics) in scores {
                        report.insert_scores(name, variant, metrics);
                    }
                }
                Ok(None) => report.insert_note(name, SKIP_EVAL_NOTE),
                Err(e) => {
                    warn!("[{}] failed: {} ({})", name, e, e.recovery_hint());
                    report.insert_note(name, format!("failed: {}", e));
                    if !e.is_recoverable() {
                        error!("Stopping batch: {}", e);
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    fn run_track(&self, provider: &dyn TrackProvider, name: &str) -> Result<Option<VariantScores>> {
        let started = Instant::now();
        let track = provider.load(name)?;
        let load_time = started.elapsed();

        let mut estimates = self.pipeline.process_track(&track)?;
        estimates.timings.io += load_time;

        let scores = if self.options.skip_eval {
            None
        } else {
            let started = Instant::now();
            let mut scores = VariantScores::new();
            for (variant, stems) in estimates.variants() {
                scores.insert(variant, self.scorer.score(&estimates.references, stems)?);
            }
            estimates.timings.eval = started.elapsed();
            Some(scores)
        };

        if let Some(wav_dir) = &self.options.wav_dir {
            let started = Instant::now();
            if let Err(e) = write_estimates(wav_dir, &estimates) {
                error!("[{}] could not write estimate WAVs: {}", name, e);
            }
            estimates.timings.io += started.elapsed();
        }

        println!("[{}] {}", name, estimates.timings);
        Ok(scores)
    }
}

/// Write `<dir>/<track>/<variant>_<source>.wav` for every estimate
pub fn write_estimates(dir: &Path, estimates: &TrackEstimates) -> Result<()> {
    let track_dir = dir.join(&estimates.name);
    std::fs::create_dir_all(&track_dir)?;
    let format = ExportFormat::default();
    for (variant, stems) in estimates.variants() {
        for (source, buffer) in stems.iter() {
            let path = track_dir.join(format!("{}_{}.wav", variant, source));
            export_audio(buffer, &path, format)?;
        }
    }
    Ok(())
}

/// Merge the optional config file with command-line overrides
pub fn build_config(args: &EvaluateArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if args.mwf {
        config.refine = true;
    }
    if let Some(iterations) = args.mwf_iter {
        config.refiner.iterations = iterations;
    }
    if args.freeze_psd {
        config.refiner.psd_update = PsdUpdate::Frozen;
    }
    if let Some(max_seconds) = args.max_seconds {
        config.max_seconds = max_seconds;
    }

    config.validate()?;
    Ok(config)
}

/// `stemeval evaluate`
pub fn evaluate(args: &EvaluateArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    info!(
        "Evaluating {} subset of {} (refine: {}, crop: {}s)",
        args.subset,
        args.musdb_root.display(),
        config.refine,
        config.max_seconds
    );

    let dataset = MusdbDirectory::open(&args.musdb_root, args.subset)
        .with_context(|| format!("Cannot open dataset at {}", args.musdb_root.display()))?;
    let pipeline = SeparationPipeline::new(config)?;
    let scorer = WindowedSdrScorer::default();

    let options = BatchOptions {
        max_tracks: args.max_tracks,
        skip_eval: args.skip_eval,
        wav_dir: args.write_wavs.then(|| args.wav_dir.clone()),
    };
    let report = BatchRunner::new(&pipeline, &scorer, options).run(&dataset)?;

    report
        .write_json(&args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    info!("{} of {} track(s) scored", report.scored_count(), report.len());
    println!("Wrote {}", args.out.display());

    Ok(())
}
