use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use slidecast::config::Config;
use slidecast::manifest;
use slidecast::slideshow::{RenderClip, SlideshowPlan};

use super::{build_pipeline, run_failed};

pub async fn cmd_plan(config: &Config, manifest_path: &Path, json: bool) -> Result<()> {
    let input = manifest::load(manifest_path)?;
    let pipeline = build_pipeline(config);
    let plan = pipeline.plan(&input).await.map_err(run_failed)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", format_plan(&plan));
    }

    Ok(())
}

/// Human-readable timeline with start offsets
fn format_plan(plan: &SlideshowPlan) -> String {
    let mut out = String::new();
    let mut start = Duration::ZERO;

    out.push_str(&format!(
        "📽️  Timeline: {} clips, {:.3}s\n",
        plan.timeline.len(),
        plan.total_duration().as_secs_f64()
    ));

    for (i, clip) in plan.timeline.clips().iter().enumerate() {
        let label = match clip {
            RenderClip::Slide { group_id, .. } => format!("slide [{group_id}]"),
            RenderClip::Transition { .. } => "transition".to_string(),
        };
        out.push_str(&format!(
            "   {:>3}  {:>8.3}s  {:>7.3}s  {:<16} {}\n",
            i + 1,
            start.as_secs_f64(),
            clip.duration().as_secs_f64(),
            label,
            clip.visual().display()
        ));
        start += clip.duration();
    }

    let loop_plan = plan.background.plan();
    let pieces: Vec<String> = loop_plan
        .pieces()
        .iter()
        .map(|p| format!("{:.3}", p.as_secs_f64()))
        .collect();
    out.push_str(&format!(
        "🎵 Background: {} x{} [{}]\n",
        plan.background.source().display(),
        loop_plan.repetitions(),
        pieces.join(" + ")
    ));

    out
}
