//! Media duration lookup via ffprobe

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{tool_command, Result, SlideshowError};

/// Anything that can report how long a media file plays
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Playback duration of the file at `path`
    async fn duration(&self, path: &Path) -> Result<Duration>;

    /// Whether the file has at least one audio stream
    async fn has_audio(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

/// ffprobe-backed [`MediaProbe`]
pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl FfprobeProbe {
    /// Create a probe, searching for ffprobe in PATH
    #[must_use]
    pub fn new() -> Self {
        Self {
            ffprobe_path: which::which("ffprobe")
                .map_or_else(|_| "ffprobe".to_string(), |p| p.to_string_lossy().to_string()),
        }
    }

    /// Use a specific ffprobe binary
    #[must_use]
    pub fn with_ffprobe_path(mut self, path: &str) -> Self {
        self.ffprobe_path = path.to_string();
        self
    }

    #[must_use]
    pub fn ffprobe_path(&self) -> &str {
        &self.ffprobe_path
    }

    /// Check if ffprobe is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeProbe {
    /// Run ffprobe with JSON output and parse the result
    async fn run(&self, args: &[&str], path: &Path) -> Result<FfprobeOutput> {
        let output = tool_command(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json"])
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SlideshowError::MissingDependency(format!("ffprobe ({})", self.ffprobe_path))
                } else {
                    SlideshowError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(SlideshowError::InvalidAsset(format!(
                "ffprobe could not read {}",
                path.display()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration(&self, path: &Path) -> Result<Duration> {
        let probe = self.run(&["-show_format"], path).await?;
        let duration = probe
            .format
            .and_then(|f| f.duration)
            .as_deref()
            .and_then(parse_duration_secs)
            .ok_or_else(|| {
                SlideshowError::InvalidAsset(format!("no duration reported for {}", path.display()))
            })?;

        debug!("Probed {}: {:.3}s", path.display(), duration.as_secs_f64());
        Ok(duration)
    }

    async fn has_audio(&self, path: &Path) -> Result<bool> {
        let probe = self
            .run(&["-show_streams", "-select_streams", "a"], path)
            .await?;
        Ok(probe.has_audio())
    }
}

/// Parse ffprobe's decimal seconds ("2.351000") into a [`Duration`].
pub(crate) fn parse_duration_secs(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

impl FfprobeOutput {
    fn has_audio(&self) -> bool {
        self.streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}
