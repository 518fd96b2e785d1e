//! User configuration loaded from `~/.config/slidecast/config.toml`.
//!
//! Every section and key is optional; anything left out falls back to the
//! built-in defaults. Command-line flags are applied on top by the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::slideshow::{
    Canvas, CommandSynthesizer, CompositorConfig, FfprobeProbe, MediaProbe, PipelineConfig,
    TtsEngine,
};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub canvas: Canvas,
    pub speech: SpeechConfig,
    pub render: RenderConfig,
    pub run: RunConfig,
}

/// `[speech]`: which TTS engine to drive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechConfig {
    pub engine: TtsEngine,
    pub language: String,
    /// Explicit TTS binary; looked up in PATH when unset.
    pub binary: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            language: "en".to_string(),
            binary: None,
        }
    }
}

/// `[render]`: ffmpeg and encoder settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub hwaccel: Option<String>,
    pub background_volume: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: None,
            crf: None,
            hwaccel: None,
            background_volume: 1.0,
        }
    }
}

/// `[run]`: per-run resources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub synthesis_concurrency: usize,
    pub scratch_root: Option<PathBuf>,
    pub keep_scratch: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            synthesis_concurrency: 4,
            scratch_root: None,
            keep_scratch: false,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With `path` set the file must exist. Without it, the default location
    /// is used and a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Pipeline settings for a run
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_canvas(self.canvas)
            .with_concurrency(self.run.synthesis_concurrency)
            .with_keep_scratch(self.run.keep_scratch);
        if let Some(ref root) = self.run.scratch_root {
            config = config.with_scratch_root(root);
        }
        config
    }

    /// Encoder settings
    #[must_use]
    pub fn compositor_config(&self) -> CompositorConfig {
        let mut config = CompositorConfig {
            video_codec: self.render.video_codec.clone(),
            audio_codec: self.render.audio_codec.clone(),
            preset: self.render.preset.clone(),
            crf: self.render.crf,
            ..CompositorConfig::default()
        }
        .with_background_volume(self.render.background_volume);

        if let Some(ref ffmpeg) = self.render.ffmpeg_path {
            config.ffmpeg_path.clone_from(ffmpeg);
        }
        if let Some(ref accel) = self.render.hwaccel {
            config = config.with_hwaccel(accel);
        }
        config
    }

    #[must_use]
    pub fn probe(&self) -> FfprobeProbe {
        match self.render.ffprobe_path {
            Some(ref path) => FfprobeProbe::new().with_ffprobe_path(path),
            None => FfprobeProbe::new(),
        }
    }

    #[must_use]
    pub fn synthesizer(&self, probe: Arc<dyn MediaProbe>) -> CommandSynthesizer {
        let synth = CommandSynthesizer::new(self.speech.engine, probe)
            .with_language(&self.speech.language);
        match self.speech.binary {
            Some(ref binary) => synth.with_binary(binary),
            None => synth,
        }
    }
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slidecast")
        .join("config.toml")
}
