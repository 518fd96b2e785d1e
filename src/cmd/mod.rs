pub mod check;
pub mod plan;
pub mod render;

use std::sync::Arc;

use slidecast::config::Config;
use slidecast::{FfmpegCompositor, RunFailure, SlideshowPipeline};

/// Wire the configured external tools into a pipeline
pub fn build_pipeline(config: &Config) -> SlideshowPipeline {
    let probe = Arc::new(config.probe());
    SlideshowPipeline::new(
        config.pipeline_config(),
        Arc::new(config.synthesizer(probe.clone())),
        probe,
        Arc::new(FfmpegCompositor::with_config(config.compositor_config())),
    )
}

/// Attach the error kind so scripts can match on it
pub fn run_failed(failure: RunFailure) -> anyhow::Error {
    let kind = failure.error.kind();
    anyhow::Error::new(failure).context(format!("slideshow run failed ({kind})"))
}
