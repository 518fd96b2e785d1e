use std::sync::Arc;

use anyhow::{bail, Result};

use slidecast::config::Config;
use slidecast::FfmpegCompositor;

pub async fn cmd_check(config: &Config) -> Result<()> {
    let compositor = FfmpegCompositor::with_config(config.compositor_config());
    let probe = config.probe();
    let ffprobe_path = probe.ffprobe_path().to_string();
    let ffprobe_ok = probe.check_available().await;
    let synth = config.synthesizer(Arc::new(probe));

    let checks = [
        ("ffmpeg", compositor.config().ffmpeg_path.clone(), compositor.check_available().await),
        ("ffprobe", ffprobe_path, ffprobe_ok),
        ("tts", synth.binary().to_string(), synth.check_available().await),
    ];

    eprintln!("🔧 Dependencies:");
    let mut missing = Vec::new();
    for (name, path, ok) in &checks {
        let mark = if *ok { "✅" } else { "❌" };
        eprintln!("   {mark} {name:<8} {path}");
        if !ok {
            missing.push(*name);
        }
    }

    if !missing.is_empty() {
        bail!("missing dependencies: {}", missing.join(", "));
    }
    Ok(())
}
