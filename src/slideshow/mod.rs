//! Narrated slideshow assembly
//!
//! Turns captioned images into a single narrated video:
//! - Speech synthesis per caption segment (external TTS)
//! - Timeline assembly with transitions at group boundaries
//! - Background bed looped to the exact timeline length
//! - ffmpeg compositing into one output file
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use slidecast::slideshow::{
//!     CaptionUnit, CommandSynthesizer, FfmpegCompositor, FfprobeProbe, PipelineConfig,
//!     SlideshowInput, SlideshowPipeline, TtsEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let probe = Arc::new(FfprobeProbe::new());
//!     let pipeline = SlideshowPipeline::new(
//!         PipelineConfig::default(),
//!         Arc::new(CommandSynthesizer::new(TtsEngine::Gtts, probe.clone())),
//!         probe,
//!         Arc::new(FfmpegCompositor::default()),
//!     );
//!
//!     let input = SlideshowInput {
//!         units: vec![CaptionUnit::new("1", "a.jpg", ["hello there"])],
//!         transition: "transition.mp4".into(),
//!         background: "background.mp3".into(),
//!     };
//!     pipeline.render(&input, "output.mp4".as_ref()).await?;
//!     Ok(())
//! }
//! ```

pub mod audio_loop;
pub mod compositor;
pub mod pipeline;
pub mod probe;
pub mod scratch;
pub mod speech;
pub mod timeline;

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use audio_loop::{AudioLoopBuilder, BackgroundTrack, LoopPlan};
pub use compositor::{Compositor, CompositorConfig, FfmpegCompositor, RenderJob};
pub use pipeline::{
    PipelineConfig, RunFailure, RunReport, RunStage, SlideshowInput, SlideshowPipeline,
    SlideshowPlan,
};
pub use probe::{FfprobeProbe, MediaProbe};
pub use scratch::RunScratch;
pub use speech::{synthesize_units, CommandSynthesizer, SpeechSynthesizer, TtsEngine};
pub use timeline::{RenderClip, Timeline, TimelineBuilder};

/// Slideshow assembly errors
#[derive(Error, Debug)]
pub enum SlideshowError {
    #[error("No narratable text in any caption unit")]
    EmptyInput,

    #[error("Missing {kind} asset: {reference}")]
    MissingAsset { kind: AssetKind, reference: String },

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SlideshowError {
    /// Stable short name for logs and exit messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::MissingAsset { .. } => "missing_asset",
            Self::InvalidAsset(_) => "invalid_asset",
            Self::Composition(_) => "composition",
            Self::Synthesis(_) => "synthesis",
            Self::Config(_) => "config",
            Self::MissingDependency(_) => "missing_dependency",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    pub(crate) fn missing(kind: AssetKind, path: &std::path::Path) -> Self {
        Self::MissingAsset {
            kind,
            reference: path.display().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SlideshowError>;

/// Role an asset plays in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Transition,
    Background,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Transition => "transition",
            Self::Background => "background",
        })
    }
}

/// One image plus the narration text shown over it.
///
/// Units sharing a `group_id` play back-to-back without a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionUnit {
    pub group_id: String,
    pub image: PathBuf,
    pub text_segments: Vec<String>,
}

impl CaptionUnit {
    pub fn new<I, S>(group_id: impl Into<String>, image: impl Into<PathBuf>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_id: group_id.into(),
            image: image.into(),
            text_segments: texts.into_iter().map(Into::into).collect(),
        }
    }

    /// Segments that produce speech, with their declared position.
    ///
    /// Blank and whitespace-only segments are skipped but keep their index,
    /// so sequence positions always refer back to `text_segments`.
    pub fn narrated_segments(&self) -> impl Iterator<Item = (usize, &str)> {
        self.text_segments
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, text.as_str()))
    }
}

/// Composite playback key: unit position, then segment position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SegmentKey {
    pub unit_index: usize,
    pub segment_index: usize,
}

impl SegmentKey {
    #[must_use]
    pub fn new(unit_index: usize, segment_index: usize) -> Self {
        Self {
            unit_index,
            segment_index,
        }
    }

    /// Scratch file name for this segment's audio.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "u{:04}_s{:03}.{extension}",
            self.unit_index, self.segment_index
        )
    }
}

/// An audio file with a measured duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioAsset {
    pub path: PathBuf,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }
}

/// Transition video inserted at group boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionAsset {
    pub path: PathBuf,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Whether the file carries its own soundtrack
    pub has_audio: bool,
}

impl TransitionAsset {
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            path: path.into(),
            duration,
            has_audio: false,
        }
    }

    #[must_use]
    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }
}

/// Synthesized narration for one non-empty text segment.
///
/// `unit_index` is the link back to the owning [`CaptionUnit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechSegment {
    pub unit_index: usize,
    pub group_id: String,
    pub sequence_index: usize,
    pub audio: AudioAsset,
    pub source_text: String,
}

impl SpeechSegment {
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.unit_index, self.sequence_index)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.audio.duration
    }
}

/// Output canvas: every clip is scaled to this size and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 24,
        }
    }
}

impl Canvas {
    /// yuv420p needs even dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SlideshowError::Config(format!(
                "canvas must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(SlideshowError::Config(format!(
                "canvas dimensions must be even, got {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(SlideshowError::Config("frame rate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Command for an external media tool.
///
/// The child is killed if its handle is dropped, so an aborted task or a
/// dropped render never outlives its scratch directory.
pub(crate) fn tool_command(program: &str) -> tokio::process::Command {
    let mut command = tokio::process::Command::new(program);
    command.stdin(std::process::Stdio::null()).kill_on_drop(true);
    command
}

/// Serialize a [`Duration`] as fractional seconds.
pub(crate) fn as_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
