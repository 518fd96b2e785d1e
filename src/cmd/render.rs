use std::path::Path;

use anyhow::Result;

use slidecast::config::Config;
use slidecast::manifest;

use super::{build_pipeline, run_failed};

pub async fn cmd_render(config: &Config, manifest_path: &Path, output: &Path) -> Result<()> {
    let input = manifest::load(manifest_path)?;
    let canvas = config.canvas;

    eprintln!("🎬 Rendering: {}", manifest_path.display());
    eprintln!("   Units: {}", input.units.len());
    eprintln!(
        "   Canvas: {}x{} @ {}fps",
        canvas.width, canvas.height, canvas.frame_rate
    );
    eprintln!("   Output: {}", output.display());

    let pipeline = build_pipeline(config);
    let report = pipeline.render(&input, output).await.map_err(run_failed)?;

    eprintln!(
        "\n✅ Slideshow complete in {:.1}s",
        report.processing_time_secs
    );
    eprintln!("   Output: {}", report.output.display());
    eprintln!(
        "   Clips: {} ({} slides, {} transitions)",
        report.clip_count, report.slide_count, report.transition_count
    );
    eprintln!(
        "   Duration: {:.3}s (narration {:.3}s)",
        report.timeline_duration.as_secs_f64(),
        report.speech_duration.as_secs_f64()
    );
    eprintln!(
        "   Background: x{} -> {:.3}s",
        report.background_repetitions,
        report.background_duration.as_secs_f64()
    );
    if let Some(ref dir) = report.scratch_dir {
        eprintln!("   Scratch kept: {}", dir.display());
    }

    Ok(())
}
