//! `slidecast` - narrated slideshow assembly
//!
//! # Features
//!
//! - **Narration**: one TTS clip per caption segment, synthesized concurrently
//! - **Timeline**: stills held for their narration, transitions between groups
//! - **Background**: music looped to the exact video length
//! - **Compositing**: a single ffmpeg run producing one output file
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use slidecast::config::Config;
//! use slidecast::{FfmpegCompositor, SlideshowPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let probe = Arc::new(config.probe());
//!     let pipeline = SlideshowPipeline::new(
//!         config.pipeline_config(),
//!         Arc::new(config.synthesizer(probe.clone())),
//!         probe,
//!         Arc::new(FfmpegCompositor::with_config(config.compositor_config())),
//!     );
//!
//!     let input = slidecast::manifest::load("deck.toml".as_ref())?;
//!     let report = pipeline.render(&input, "deck.mp4".as_ref()).await?;
//!     println!("Rendered {:.1}s", report.timeline_duration.as_secs_f64());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod manifest;
pub mod slideshow;

pub use slideshow::{
    AudioLoopBuilder, CaptionUnit, CommandSynthesizer, FfmpegCompositor, FfprobeProbe,
    RunFailure, RunReport, SlideshowError, SlideshowInput, SlideshowPipeline, TimelineBuilder,
    TtsEngine,
};

/// Version of slidecast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
