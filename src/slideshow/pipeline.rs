//! Full slideshow pipeline: synthesize -> assemble -> loop background -> composite
//!
//! Runs the stages strictly in order. The first failure ends the run, and
//! the returned [`RunFailure`] names the stage it happened in. Every run
//! works inside its own [`RunScratch`], which is released on every exit path.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::audio_loop::{AudioLoopBuilder, BackgroundTrack};
use super::compositor::{Compositor, RenderJob};
use super::probe::MediaProbe;
use super::scratch::RunScratch;
use super::speech::{synthesize_units, SpeechSynthesizer};
use super::timeline::{count_group_boundaries, order_segments, Timeline, TimelineBuilder};
use super::{
    as_secs, AssetKind, AudioAsset, Canvas, CaptionUnit, Result, SlideshowError,
    TransitionAsset,
};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output canvas
    pub canvas: Canvas,
    /// Maximum concurrent TTS calls
    pub synthesis_concurrency: usize,
    /// Directory under which per-run scratch directories are created
    pub scratch_root: PathBuf,
    /// Leave the run's scratch directory on disk afterwards
    pub keep_scratch: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            synthesis_concurrency: 4,
            scratch_root: std::env::temp_dir().join("slidecast"),
            keep_scratch: false,
        }
    }
}

impl PipelineConfig {
    /// Set output canvas
    #[must_use]
    pub fn with_canvas(mut self, canvas: Canvas) -> Self {
        self.canvas = canvas;
        self
    }

    /// Set TTS concurrency (at least 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.synthesis_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    #[must_use]
    pub fn with_keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }
}

/// Everything a run consumes
#[derive(Debug, Clone)]
pub struct SlideshowInput {
    /// Caption units in declaration order
    pub units: Vec<CaptionUnit>,
    /// Video placed between groups (only read if a boundary exists)
    pub transition: PathBuf,
    /// Music looped under the narration
    pub background: PathBuf,
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Canvas validation and scratch setup, before any work
    Prepare,
    Synthesize,
    AssembleTimeline,
    BuildBackground,
    Composite,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "prepare",
            Self::Synthesize => "synthesize",
            Self::AssembleTimeline => "assemble_timeline",
            Self::BuildBackground => "build_background",
            Self::Composite => "composite",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// A run that ended in [`RunStage::Failed`]
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct RunFailure {
    /// Stage that was running when the error occurred
    pub stage: RunStage,
    #[source]
    pub error: SlideshowError,
}

/// Summary of a completed render
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub output: PathBuf,
    pub clip_count: usize,
    pub slide_count: usize,
    pub transition_count: usize,
    #[serde(serialize_with = "as_secs")]
    pub speech_duration: Duration,
    #[serde(serialize_with = "as_secs")]
    pub timeline_duration: Duration,
    #[serde(serialize_with = "as_secs")]
    pub background_duration: Duration,
    pub background_repetitions: usize,
    /// Set when the scratch directory was kept
    pub scratch_dir: Option<PathBuf>,
    pub processing_time_secs: f64,
}

/// Timeline plus background, ready for compositing
#[derive(Debug, Clone, Serialize)]
pub struct SlideshowPlan {
    pub timeline: Timeline,
    pub background: BackgroundTrack,
}

impl SlideshowPlan {
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.timeline.total_duration()
    }
}

/// Narrated slideshow pipeline
pub struct SlideshowPipeline {
    config: PipelineConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    probe: Arc<dyn MediaProbe>,
    compositor: Arc<dyn Compositor>,
}

impl SlideshowPipeline {
    pub fn new(
        config: PipelineConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        probe: Arc<dyn MediaProbe>,
        compositor: Arc<dyn Compositor>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            probe,
            compositor,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and write the result to `output`.
    ///
    /// `output` is only created once compositing has fully succeeded.
    pub async fn render(
        &self,
        input: &SlideshowInput,
        output: &Path,
    ) -> std::result::Result<RunReport, RunFailure> {
        let start_time = Instant::now();

        self.config
            .canvas
            .validate()
            .map_err(|e| fail(RunStage::Prepare, e))?;
        let scratch = self.open_scratch()?;
        let run = scratch.run_id().to_string();

        info!("[{run}] Rendering {} units to {}", input.units.len(), output.display());

        let plan = self.assemble(input, &scratch).await?;

        enter(&run, RunStage::Composite);
        let staging = scratch.path(&staging_name(output));
        let job = RenderJob {
            timeline: &plan.timeline,
            background: &plan.background,
            canvas: self.config.canvas,
            output: &staging,
        };
        self.compositor
            .render(job)
            .await
            .map_err(|e| fail(RunStage::Composite, e))?;
        promote(&staging, output)
            .await
            .map_err(|e| fail(RunStage::Composite, e))?;

        let scratch_dir = self.config.keep_scratch.then(|| scratch.dir().to_path_buf());
        if let Err(e) = scratch.release() {
            warn!("[{run}] Failed to release scratch: {e}");
        }

        enter(&run, RunStage::Done);
        let elapsed = start_time.elapsed().as_secs_f64();
        info!("[{run}] Pipeline completed in {:.2}s", elapsed);

        Ok(RunReport {
            run_id: run,
            output: output.to_path_buf(),
            clip_count: plan.timeline.len(),
            slide_count: plan.timeline.slide_count(),
            transition_count: plan.timeline.transition_count(),
            speech_duration: plan.timeline.narration_duration(),
            timeline_duration: plan.timeline.total_duration(),
            background_duration: plan.background.duration(),
            background_repetitions: plan.background.plan().repetitions(),
            scratch_dir,
            processing_time_secs: elapsed,
        })
    }

    /// Run everything up to compositing and return the plan.
    ///
    /// Narration is still synthesized (durations come from the audio), but
    /// nothing is encoded. The run's scratch directory is released before
    /// returning unless `keep_scratch` is set, so the plan's narration paths
    /// only name files that still exist in that case.
    pub async fn plan(
        &self,
        input: &SlideshowInput,
    ) -> std::result::Result<SlideshowPlan, RunFailure> {
        let scratch = self.open_scratch()?;
        let run = scratch.run_id();
        let plan = self.assemble(input, &scratch).await?;
        if let Err(e) = scratch.release() {
            warn!("[{run}] Failed to release scratch: {e}");
        }
        Ok(plan)
    }

    fn open_scratch(&self) -> std::result::Result<RunScratch, RunFailure> {
        RunScratch::create(&self.config.scratch_root)
            .map(|s| s.keep(self.config.keep_scratch))
            .map_err(|e| fail(RunStage::Prepare, e))
    }

    /// Synthesize, assemble timeline, build background
    async fn assemble(
        &self,
        input: &SlideshowInput,
        scratch: &RunScratch,
    ) -> std::result::Result<SlideshowPlan, RunFailure> {
        let run = scratch.run_id().to_string();

        enter(&run, RunStage::Synthesize);
        let audio_dir = scratch
            .subdir("speech")
            .map_err(|e| fail(RunStage::Synthesize, e))?;
        let mut segments = synthesize_units(
            &input.units,
            self.synthesizer.clone(),
            &audio_dir,
            self.config.synthesis_concurrency,
        )
        .await
        .map_err(|e| fail(RunStage::Synthesize, e))?;

        enter(&run, RunStage::AssembleTimeline);
        order_segments(&mut segments);
        let mut builder = TimelineBuilder::new();
        if count_group_boundaries(&segments) > 0 {
            let transition = self
                .resolve_transition(&input.transition)
                .await
                .map_err(|e| fail(RunStage::AssembleTimeline, e))?;
            builder = builder.with_transition(transition);
        }
        let timeline = builder
            .build(&input.units, segments)
            .map_err(|e| fail(RunStage::AssembleTimeline, e))?;

        enter(&run, RunStage::BuildBackground);
        let background = self
            .resolve(AssetKind::Background, &input.background)
            .await
            .map(|d| AudioAsset::new(&input.background, d))
            .and_then(|bg| AudioLoopBuilder::build(&bg, timeline.total_duration()))
            .map_err(|e| fail(RunStage::BuildBackground, e))?;

        info!(
            "[{run}] Timeline: {} clips ({} transitions), {:.3}s; background x{}",
            timeline.len(),
            timeline.transition_count(),
            timeline.total_duration().as_secs_f64(),
            background.plan().repetitions()
        );

        Ok(SlideshowPlan {
            timeline,
            background,
        })
    }

    async fn resolve_transition(&self, path: &Path) -> Result<TransitionAsset> {
        let duration = self.resolve(AssetKind::Transition, path).await?;
        let has_audio = self.probe.has_audio(path).await?;
        Ok(TransitionAsset::new(path, duration).with_audio(has_audio))
    }

    /// Existence check, then measured duration
    async fn resolve(&self, kind: AssetKind, path: &Path) -> Result<Duration> {
        if !path.is_file() {
            return Err(SlideshowError::missing(kind, path));
        }
        let duration = self.probe.duration(path).await?;
        if kind == AssetKind::Transition && duration.is_zero() {
            return Err(SlideshowError::InvalidAsset(format!(
                "transition {} has no duration",
                path.display()
            )));
        }
        debug!("Resolved {kind} {}: {:.3}s", path.display(), duration.as_secs_f64());
        Ok(duration)
    }
}

fn enter(run: &str, stage: RunStage) {
    info!("[{run}] Stage: {stage}");
}

fn fail(stage: RunStage, error: SlideshowError) -> RunFailure {
    warn!(
        "Stage {stage} -> {}: {} ({})",
        RunStage::Failed,
        error,
        error.kind()
    );
    RunFailure { stage, error }
}

/// Scratch file name for the render, keeping the output's container
fn staging_name(output: &Path) -> String {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    format!("render.{ext}")
}

/// Move the finished render into place.
///
/// Falls back to copying across filesystems. A failed copy leaves no file
/// at `output`.
async fn promote(staging: &Path, output: &Path) -> Result<()> {
    if !staging.is_file() {
        return Err(SlideshowError::Composition(
            "compositor reported success but wrote no output".to_string(),
        ));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let Err(e) = tokio::fs::rename(staging, output).await {
        debug!("Rename into place failed ({e}), copying");
        if let Err(e) = tokio::fs::copy(staging, output).await {
            let _ = tokio::fs::remove_file(output).await;
            return Err(e.into());
        }
    }

    Ok(())
}
