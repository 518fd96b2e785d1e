//! Text-to-speech for caption segments
//!
//! Synthesis runs through an external TTS command (gtts-cli or espeak-ng).
//! Calls for different segments are independent, so they fan out over a
//! bounded number of tasks. The results are always re-sorted by
//! [`SegmentKey`] afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::probe::MediaProbe;
use super::{AudioAsset, CaptionUnit, Result, SegmentKey, SlideshowError, SpeechSegment};

/// Text in, audio file with a known duration out
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// File extension of the audio this synthesizer writes
    fn extension(&self) -> &str;

    /// Speak `text` into a new audio file at `output`
    async fn synthesize(&self, text: &str, output: &Path) -> Result<AudioAsset>;
}

/// Supported TTS command-line engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// Google Translate TTS via `gtts-cli` (mp3)
    #[default]
    Gtts,
    /// Offline `espeak-ng` (wav)
    Espeak,
}

impl TtsEngine {
    /// Binary looked up in PATH when none is configured
    #[must_use]
    pub fn default_binary(&self) -> &'static str {
        match self {
            Self::Gtts => "gtts-cli",
            Self::Espeak => "espeak-ng",
        }
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gtts => "mp3",
            Self::Espeak => "wav",
        }
    }

    /// Command-line arguments to speak `text` into `output`
    fn build_args(&self, text: &str, language: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy().to_string();
        match self {
            Self::Gtts => vec![
                "--lang".to_string(),
                language.to_string(),
                "--output".to_string(),
                output,
                "--".to_string(),
                text.to_string(),
            ],
            Self::Espeak => vec![
                "-v".to_string(),
                language.to_string(),
                "-w".to_string(),
                output,
                text.to_string(),
            ],
        }
    }
}

/// [`SpeechSynthesizer`] backed by a TTS command-line tool
pub struct CommandSynthesizer {
    engine: TtsEngine,
    binary: String,
    language: String,
    probe: Arc<dyn MediaProbe>,
}

impl CommandSynthesizer {
    /// Create a synthesizer, searching for the engine's binary in PATH
    pub fn new(engine: TtsEngine, probe: Arc<dyn MediaProbe>) -> Self {
        let binary = which::which(engine.default_binary()).map_or_else(
            |_| engine.default_binary().to_string(),
            |p| p.to_string_lossy().to_string(),
        );

        Self {
            engine,
            binary,
            language: "en".to_string(),
            probe,
        }
    }

    /// Use a specific TTS binary
    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Set the speech language (e.g. "en", "fi")
    #[must_use]
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    #[must_use]
    pub fn engine(&self) -> TtsEngine {
        self.engine
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check if the TTS binary can be started
    pub async fn check_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn extension(&self) -> &str {
        self.engine.extension()
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<AudioAsset> {
        let args = self.engine.build_args(text, &self.language, output);
        debug!("Running {} with args: {:?}", self.binary, args);

        let result = super::tool_command(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SlideshowError::MissingDependency(format!("TTS engine ({})", self.binary))
                } else {
                    SlideshowError::Io(e)
                }
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SlideshowError::Synthesis(format!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(SlideshowError::Synthesis(format!(
                "{} produced no audio at {}",
                self.binary,
                output.display()
            )));
        }

        let duration = self.probe.duration(output).await?;
        Ok(AudioAsset::new(output, duration))
    }
}

/// A pending synthesis call
struct SpeechJob {
    key: SegmentKey,
    group_id: String,
    text: String,
    output: PathBuf,
}

/// Synthesize every non-empty segment of `units` into `audio_dir`.
///
/// At most `concurrency` calls run at once. The first failure aborts the
/// remaining calls and is returned unchanged. The result is in playback
/// order.
pub async fn synthesize_units(
    units: &[CaptionUnit],
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio_dir: &Path,
    concurrency: usize,
) -> Result<Vec<SpeechSegment>> {
    let extension = synthesizer.extension().to_string();
    let jobs: Vec<SpeechJob> = units
        .iter()
        .enumerate()
        .flat_map(|(unit_index, unit)| {
            unit.narrated_segments().map(move |(segment_index, text)| {
                (unit_index, unit.group_id.clone(), segment_index, text.to_string())
            })
        })
        .map(|(unit_index, group_id, segment_index, text)| {
            let key = SegmentKey::new(unit_index, segment_index);
            SpeechJob {
                output: audio_dir.join(key.file_name(&extension)),
                key,
                group_id,
                text,
            }
        })
        .collect();

    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    info!(
        "Synthesizing {} segments (concurrency: {})",
        jobs.len(),
        concurrency.max(1)
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let sem = semaphore.clone();
        let synthesizer = synthesizer.clone();

        handles.push(tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| SlideshowError::Synthesis(e.to_string()))?;
            let audio = synthesizer.synthesize(&job.text, &job.output).await?;
            debug!(
                "Synthesized {:?}: {:.3}s",
                job.key,
                audio.duration.as_secs_f64()
            );
            Ok::<_, SlideshowError>(SpeechSegment {
                unit_index: job.key.unit_index,
                group_id: job.group_id,
                sequence_index: job.key.segment_index,
                audio,
                source_text: job.text,
            })
        }));
    }

    let mut segments = Vec::with_capacity(handles.len());
    let mut pending = handles.into_iter();

    while let Some(handle) = pending.next() {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SlideshowError::Synthesis(format!("synthesis task failed: {e}"))),
        };

        match outcome {
            Ok(segment) => segments.push(segment),
            Err(e) => {
                for rest in pending {
                    rest.abort();
                }
                return Err(e);
            }
        }
    }

    segments.sort_by_key(SpeechSegment::key);
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake TTS: duration from a lookup table, with jittered completion order.
    struct TableSynth {
        durations: HashMap<String, Duration>,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl TableSynth {
        fn new(entries: &[(&str, u64)]) -> Self {
            Self {
                durations: entries
                    .iter()
                    .map(|(t, ms)| ((*t).to_string(), Duration::from_millis(*ms)))
                    .collect(),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for TableSynth {
        fn extension(&self) -> &str {
            "mp3"
        }

        async fn synthesize(&self, text: &str, output: &Path) -> Result<AudioAsset> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(text.to_string());

            // Later segments finish first to scramble completion order.
            let delay = 30u64.saturating_sub(text.len() as u64 * 3);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            let duration = *self
                .durations
                .get(text)
                .ok_or_else(|| SlideshowError::Synthesis(format!("no voice for {text:?}")))?;
            Ok(AudioAsset::new(output, duration))
        }
    }

    #[test]
    fn test_engine_args() {
        let args = TtsEngine::Gtts.build_args("-hello", "en", Path::new("/s/a.mp3"));
        assert_eq!(args, vec!["--lang", "en", "--output", "/s/a.mp3", "--", "-hello"]);

        let args = TtsEngine::Espeak.build_args("hi", "fi", Path::new("/s/a.wav"));
        assert_eq!(args[..4], ["-v", "fi", "-w", "/s/a.wav"]);
        assert_eq!(TtsEngine::Espeak.extension(), "wav");
    }

    #[test]
    fn test_engine_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            engine: TtsEngine,
        }
        let w: Wrap = toml::from_str("engine = \"espeak\"").unwrap();
        assert_eq!(w.engine, TtsEngine::Espeak);
    }

    #[tokio::test]
    async fn test_blank_segments_are_not_synthesized() {
        let synth = Arc::new(TableSynth::new(&[("ok", 400)]));
        let units = vec![CaptionUnit::new("1", "a.jpg", ["", "   ", "ok"])];

        let segments = synthesize_units(&units, synth.clone(), Path::new("/scratch"), 4)
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sequence_index, 2);
        assert_eq!(segments[0].source_text, "ok");
        assert_eq!(segments[0].audio.path, Path::new("/scratch/u0000_s002.mp3"));
        assert_eq!(*synth.calls.lock().unwrap(), vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_all_blank_yields_nothing() {
        let synth = Arc::new(TableSynth::new(&[]));
        let units = vec![CaptionUnit::new("1", "a.jpg", ["", " \t "])];
        let segments = synthesize_units(&units, synth, Path::new("/scratch"), 2)
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded_and_ordered() {
        let synth = Arc::new(TableSynth::new(&[
            ("a", 100),
            ("bb", 200),
            ("ccc", 300),
            ("dddd", 400),
            ("eeeee", 500),
            ("ffffff", 600),
        ]));
        let units = vec![
            CaptionUnit::new("1", "a.jpg", ["a", "bb"]),
            CaptionUnit::new("2", "b.jpg", ["ccc"]),
            CaptionUnit::new("3", "c.jpg", ["dddd", "eeeee", "ffffff"]),
        ];

        let segments = synthesize_units(&units, synth.clone(), Path::new("/s"), 2)
            .await
            .unwrap();

        let keys: Vec<_> = segments.iter().map(SpeechSegment::key).collect();
        assert_eq!(
            keys,
            vec![
                SegmentKey::new(0, 0),
                SegmentKey::new(0, 1),
                SegmentKey::new(1, 0),
                SegmentKey::new(2, 0),
                SegmentKey::new(2, 1),
                SegmentKey::new(2, 2),
            ]
        );
        assert_eq!(segments[3].group_id, "3");
        assert!(synth.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let synth = Arc::new(TableSynth::new(&[("known", 100)]));
        let units = vec![CaptionUnit::new("1", "a.jpg", ["known", "unknown"])];
        let err = synthesize_units(&units, synth, Path::new("/s"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SlideshowError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_command_synthesizer_missing_binary() {
        let probe: Arc<dyn MediaProbe> = Arc::new(crate::slideshow::FfprobeProbe::new());
        let synth = CommandSynthesizer::new(TtsEngine::Gtts, probe)
            .with_binary("/nonexistent/gtts-cli");
        let err = synth
            .synthesize("hello", Path::new("/tmp/never.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, SlideshowError::MissingDependency(_)));
    }
}
