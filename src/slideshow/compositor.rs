//! ffmpeg-based slideshow compositor
//!
//! Renders a [`Timeline`] plus [`BackgroundTrack`] in a single ffmpeg run:
//! - Every clip scaled to the canvas and concatenated without gaps
//! - Clip boundaries snapped to the output frame grid, narration padded or
//!   trimmed to the same sample boundary
//! - Background looped per its [`LoopPlan`](super::LoopPlan) and mixed additively

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::audio_loop::BackgroundTrack;
use super::timeline::{RenderClip, Timeline};
use super::{Canvas, Result, SlideshowError};

/// Lines of ffmpeg stderr kept for error reports
const STDERR_TAIL_LINES: usize = 12;

/// Everything the compositor needs for one output file
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub timeline: &'a Timeline,
    pub background: &'a BackgroundTrack,
    pub canvas: Canvas,
    pub output: &'a Path,
}

/// Renders a timeline and background bed into one media file
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn render(&self, job: RenderJob<'_>) -> Result<()>;
}

/// Configuration for the compositor
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Video encoder
    pub video_codec: String,
    /// Audio encoder
    pub audio_codec: String,
    /// Video bitrate (e.g., "5M")
    pub video_bitrate: Option<String>,
    /// Audio bitrate (e.g., "192k")
    pub audio_bitrate: Option<String>,
    /// x264-style preset
    pub preset: Option<String>,
    /// Constant rate factor
    pub crf: Option<u8>,
    /// Gain applied to the background before mixing (1.0 = unchanged)
    pub background_volume: f32,
    /// Sample rate all audio is resampled to
    pub sample_rate: u32,
    /// Additional ffmpeg output arguments
    pub output_args: Vec<String>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: which::which("ffmpeg").map_or_else(
                |_| "ffmpeg".to_string(),
                |p| p.to_string_lossy().to_string(),
            ),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: None,
            audio_bitrate: None,
            preset: None,
            crf: None,
            background_volume: 1.0,
            sample_rate: 44_100,
            output_args: Vec::new(),
        }
    }
}

impl CompositorConfig {
    /// Quick renders for previewing
    #[must_use]
    pub fn fast() -> Self {
        Self {
            preset: Some("ultrafast".to_string()),
            crf: Some(28),
            ..Default::default()
        }
    }

    /// Create config for high-quality file output
    #[must_use]
    pub fn high_quality() -> Self {
        Self {
            video_bitrate: Some("10M".to_string()),
            audio_bitrate: Some("192k".to_string()),
            preset: Some("slow".to_string()),
            crf: Some(18),
            ..Default::default()
        }
    }

    /// Encode on a hardware encoder.
    ///
    /// Only the encoder changes. Inputs are stills and short clips, so
    /// decoding stays in software and no `-hwaccel` flag is passed.
    #[must_use]
    pub fn with_hwaccel(mut self, accel: &str) -> Self {
        self.video_codec = match accel {
            "videotoolbox" => "h264_videotoolbox".to_string(),
            "cuda" | "nvenc" => "h264_nvenc".to_string(),
            "vaapi" => "h264_vaapi".to_string(),
            "qsv" => "h264_qsv".to_string(),
            _ => "libx264".to_string(),
        };

        // Software-only rate control knobs don't apply to hardware encoders
        if self.video_codec != "libx264" {
            self.preset = None;
            self.crf = None;
        }

        self
    }

    /// Set background gain
    #[must_use]
    pub fn with_background_volume(mut self, volume: f32) -> Self {
        self.background_volume = volume;
        self
    }
}

/// ffmpeg-based [`Compositor`]
pub struct FfmpegCompositor {
    config: CompositorConfig,
}

impl FfmpegCompositor {
    /// Create a new compositor with custom config
    #[must_use]
    pub fn with_config(config: CompositorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Check if ffmpeg is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Input arguments, one or two inputs per clip, background last.
    ///
    /// Returns the args plus each clip's (video, audio) input index and
    /// the background input index.
    fn build_inputs(
        &self,
        timeline: &Timeline,
        background: &BackgroundTrack,
        spans: &[ClipSpan],
        fps: u32,
    ) -> (Vec<String>, Vec<(usize, Option<usize>)>, Option<usize>) {
        let mut args = Vec::new();
        let mut indices = Vec::with_capacity(timeline.len());
        let mut next = 0usize;

        for (clip, span) in timeline.clips().iter().zip(spans) {
            match clip {
                RenderClip::Slide {
                    image, narration, ..
                } => {
                    // One spare frame so the trim never runs short
                    args.extend([
                        "-loop".to_string(),
                        "1".to_string(),
                        "-framerate".to_string(),
                        fps.to_string(),
                        "-t".to_string(),
                        secs(grid_duration(span.frames + 1, fps)),
                        "-i".to_string(),
                        image.to_string_lossy().to_string(),
                        "-i".to_string(),
                        narration.path.to_string_lossy().to_string(),
                    ]);
                    indices.push((next, Some(next + 1)));
                    next += 2;
                }
                RenderClip::Transition {
                    path, has_audio, ..
                } => {
                    args.extend(["-i".to_string(), path.to_string_lossy().to_string()]);
                    indices.push((next, has_audio.then_some(next)));
                    next += 1;
                }
            }
        }

        let plan = background.plan();
        let background_index = if plan.is_empty() {
            None
        } else {
            // stream_loop N plays the input N+1 times
            args.extend([
                "-stream_loop".to_string(),
                (plan.repetitions() - 1).to_string(),
                "-i".to_string(),
                background.source().to_string_lossy().to_string(),
            ]);
            Some(next)
        };

        (args, indices, background_index)
    }

    /// Build the `-filter_complex` graph.
    ///
    /// Produces `[vout]` and `[aout]`.
    fn build_filter_complex(
        &self,
        timeline: &Timeline,
        background: &BackgroundTrack,
        canvas: Canvas,
        spans: &[ClipSpan],
        indices: &[(usize, Option<usize>)],
        background_index: Option<usize>,
    ) -> String {
        let rate = self.config.sample_rate;
        let audio_format = format!(
            "aresample={rate},aformat=sample_fmts=fltp:channel_layouts=stereo"
        );
        let video_format = format!(
            "scale={w}:{h},setsar=1,fps={fps},format=yuv420p",
            w = canvas.width,
            h = canvas.height,
            fps = canvas.frame_rate,
        );

        let mut filters = Vec::new();
        let mut concat_inputs = String::new();

        let clips = timeline.clips().iter().zip(spans).zip(indices);
        for (n, ((clip, span), (video_in, audio_in))) in clips.enumerate() {
            let ClipSpan { frames, samples } = *span;

            // A transition file can come up short of its grid slot
            let pad = match clip {
                RenderClip::Transition { .. } => "tpad=stop_mode=clone:stop=2,",
                RenderClip::Slide { .. } => "",
            };
            filters.push(format!(
                "[{video_in}:v]{video_format},{pad}trim=end_frame={frames},setpts=PTS-STARTPTS[v{n}]"
            ));

            match audio_in {
                Some(audio_in) => filters.push(format!(
                    "[{audio_in}:a]{audio_format},apad,atrim=end_sample={samples},asetpts=PTS-STARTPTS[a{n}]"
                )),
                None => filters.push(format!(
                    "anullsrc=r={rate}:cl=stereo,{audio_format},atrim=end_sample={samples}[a{n}]"
                )),
            }

            let _ = write!(concat_inputs, "[v{n}][a{n}]");
        }

        filters.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=1[vout][narration]",
            timeline.len()
        ));

        match background_index {
            Some(bg) => {
                let total = secs(background.duration());
                filters.push(format!(
                    "[{bg}:a]{audio_format},atrim=duration={total},asetpts=PTS-STARTPTS,volume={vol}[bed]",
                    vol = self.config.background_volume,
                ));
                filters.push(
                    "[narration][bed]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]"
                        .to_string(),
                );
            }
            None => filters.push("[narration]anull[aout]".to_string()),
        }

        filters.join(";")
    }

    /// Build ffmpeg arguments
    fn build_args(&self, job: &RenderJob<'_>) -> Vec<String> {
        let mut args = Vec::new();

        // Hide banner, show stats
        args.extend(
            ["-hide_banner", "-loglevel", "warning", "-stats"]
                .iter()
                .map(std::string::ToString::to_string),
        );

        let fps = job.canvas.frame_rate;
        let spans = frame_grid(
            job.timeline.clips().iter().map(RenderClip::duration),
            fps,
            self.config.sample_rate,
        );
        let total_frames: u64 = spans.iter().map(|s| s.frames).sum();

        let (inputs, indices, background_index) =
            self.build_inputs(job.timeline, job.background, &spans, fps);
        args.extend(inputs);

        args.push("-filter_complex".to_string());
        args.push(self.build_filter_complex(
            job.timeline,
            job.background,
            job.canvas,
            &spans,
            &indices,
            background_index,
        ));

        args.extend(["-map", "[vout]", "-map", "[aout]"].iter().map(std::string::ToString::to_string));

        args.push("-c:v".to_string());
        args.push(self.config.video_codec.clone());
        args.push("-pix_fmt".to_string());
        args.push("yuv420p".to_string());
        args.push("-r".to_string());
        args.push(job.canvas.frame_rate.to_string());

        if let Some(ref preset) = self.config.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        if let Some(crf) = self.config.crf {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }
        if let Some(ref bitrate) = self.config.video_bitrate {
            args.push("-b:v".to_string());
            args.push(bitrate.clone());
        }

        args.push("-c:a".to_string());
        args.push(self.config.audio_codec.clone());
        if let Some(ref bitrate) = self.config.audio_bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.clone());
        }

        args.push("-t".to_string());
        args.push(secs(grid_duration(total_frames, fps)));
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());

        args.extend(self.config.output_args.clone());

        args.push("-y".to_string()); // Overwrite
        args.push(job.output.to_string_lossy().to_string());

        args
    }
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self::with_config(CompositorConfig::default())
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn render(&self, job: RenderJob<'_>) -> Result<()> {
        if job.timeline.is_empty() {
            return Err(SlideshowError::Composition("timeline has no clips".to_string()));
        }

        let args = self.build_args(&job);
        debug!("ffmpeg args: {:?}", args);

        let mut child = super::tool_command(&self.config.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SlideshowError::MissingDependency(format!("ffmpeg ({})", self.config.ffmpeg_path))
                } else {
                    SlideshowError::Io(e)
                }
            })?;

        // Spawn stderr reader for logging, keeping a short tail for errors
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES + 1);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") || line.contains("Warning") {
                        warn!("ffmpeg: {}", line);
                    } else {
                        debug!("ffmpeg: {}", line);
                    }
                    push_tail(&mut tail, line);
                }
                tail
            })
        });

        let status = child.wait().await?;
        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => VecDeque::new(),
        };

        if !status.success() {
            return Err(SlideshowError::Composition(format!(
                "ffmpeg exited with status: {status}: {}",
                join_tail(&tail)
            )));
        }

        info!(
            "Composited {} clips ({:.2}s) to {}",
            job.timeline.len(),
            job.timeline.total_duration().as_secs_f64(),
            job.output.display()
        );
        Ok(())
    }
}

/// ffmpeg time value in seconds, microsecond resolution
fn secs(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64())
}

/// Keep the last [`STDERR_TAIL_LINES`] lines
fn push_tail(tail: &mut VecDeque<String>, line: String) {
    tail.push_back(line);
    if tail.len() > STDERR_TAIL_LINES {
        tail.pop_front();
    }
}

fn join_tail(tail: &VecDeque<String>) -> String {
    tail.iter().map(String::as_str).collect::<Vec<_>>().join(" | ")
}

/// One clip's length on the output grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClipSpan {
    frames: u64,
    samples: u64,
}

/// Snap clip boundaries to whole frames.
///
/// Each clip ends on the frame nearest its exact cumulative end, so rounding
/// never accumulates along the timeline, and every clip keeps at least one
/// frame. Sample counts follow the same boundaries, so audio and video of a
/// clip always have equal length and the spans add up to the output length.
fn frame_grid(
    durations: impl IntoIterator<Item = Duration>,
    fps: u32,
    sample_rate: u32,
) -> Vec<ClipSpan> {
    let mut spans = Vec::new();
    let mut elapsed = Duration::ZERO;
    let (mut end_frame, mut end_sample) = (0u64, 0u64);

    for duration in durations {
        elapsed += duration;
        let frame = frames_at(elapsed, fps).max(end_frame.saturating_add(1));
        let sample = samples_at(frame, fps, sample_rate).max(end_sample);
        spans.push(ClipSpan {
            frames: frame - end_frame,
            samples: sample - end_sample,
        });
        end_frame = frame;
        end_sample = sample;
    }
    spans
}

/// Nearest frame boundary to `d`
fn frames_at(d: Duration, fps: u32) -> u64 {
    let scaled = d.as_nanos() * u128::from(fps);
    u64::try_from((scaled + 500_000_000) / 1_000_000_000).unwrap_or(u64::MAX)
}

/// Nearest sample boundary to the start of `frame`
fn samples_at(frame: u64, fps: u32, sample_rate: u32) -> u64 {
    let fps = u128::from(fps.max(1));
    let scaled = u128::from(frame) * u128::from(sample_rate);
    u64::try_from((scaled + fps / 2) / fps).unwrap_or(u64::MAX)
}

/// Exact length of `frames` frames
fn grid_duration(frames: u64, fps: u32) -> Duration {
    let nanos = u128::from(frames) * 1_000_000_000 / u128::from(fps.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slideshow::{
        AudioAsset, AudioLoopBuilder, CaptionUnit, SpeechSegment, TimelineBuilder,
        TransitionAsset,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn segment(unit: usize, group: &str, seq: usize, millis: u64) -> SpeechSegment {
        SpeechSegment {
            unit_index: unit,
            group_id: group.to_string(),
            sequence_index: seq,
            audio: AudioAsset::new(
                format!("/s/u{unit:04}_s{seq:03}.mp3"),
                Duration::from_millis(millis),
            ),
            source_text: "text".to_string(),
        }
    }

    fn build(
        dir: &TempDir,
        segments: Vec<SpeechSegment>,
        transition_audio: bool,
    ) -> (Timeline, BackgroundTrack) {
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let t = dir.path().join("t.mp4");
        for p in [&a, &b, &t] {
            std::fs::write(p, b"x").unwrap();
        }

        let units = vec![
            CaptionUnit::new("1", &a, ["hi", "there"]),
            CaptionUnit::new("2", &b, ["bye"]),
        ];
        let transition =
            TransitionAsset::new(&t, Duration::from_secs(1)).with_audio(transition_audio);
        let timeline = TimelineBuilder::new()
            .with_transition(transition)
            .build(&units, segments)
            .unwrap();
        let bed = AudioLoopBuilder::build(
            &AudioAsset::new("/music/bg.mp3", Duration::from_millis(1200)),
            timeline.total_duration(),
        )
        .unwrap();
        (timeline, bed)
    }

    fn fixture(dir: &TempDir) -> (Timeline, BackgroundTrack) {
        build(dir, vec![segment(0, "1", 0, 800), segment(1, "2", 0, 500)], false)
    }

    fn graph(compositor: &FfmpegCompositor, timeline: &Timeline, bed: &BackgroundTrack) -> String {
        let canvas = Canvas::default();
        let spans = frame_grid(
            timeline.clips().iter().map(RenderClip::duration),
            canvas.frame_rate,
            compositor.config().sample_rate,
        );
        let (_, indices, bg) = compositor.build_inputs(timeline, bed, &spans, canvas.frame_rate);
        compositor.build_filter_complex(timeline, bed, canvas, &spans, &indices, bg)
    }

    /// Numbers following each occurrence of `key` in `text`
    fn values_after(text: &str, key: &str) -> Vec<u64> {
        text.split(key)
            .skip(1)
            .map(|rest| {
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap()
            })
            .collect()
    }

    fn job<'a>(timeline: &'a Timeline, bed: &'a BackgroundTrack, out: &'a Path) -> RenderJob<'a> {
        RenderJob {
            timeline,
            background: bed,
            canvas: Canvas::default(),
            output: out,
        }
    }

    #[test]
    fn test_compositor_config_high_quality() {
        let config = CompositorConfig::high_quality();
        assert_eq!(config.crf, Some(18));
        assert_eq!(config.preset.as_deref(), Some("slow"));
    }

    #[test]
    fn test_compositor_config_hwaccel() {
        let config = CompositorConfig::fast().with_hwaccel("videotoolbox");
        assert_eq!(config.video_codec, "h264_videotoolbox");
        assert!(config.preset.is_none());
        assert_eq!(CompositorConfig::default().with_hwaccel("nvenc").video_codec, "h264_nvenc");
        assert_eq!(CompositorConfig::default().with_hwaccel("cuda").video_codec, "h264_nvenc");
    }

    #[test]
    fn test_hwaccel_only_switches_encoder() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let out = PathBuf::from("/scratch/render.mp4");

        for accel in ["nvenc", "cuda", "videotoolbox", "vaapi"] {
            let compositor =
                FfmpegCompositor::with_config(CompositorConfig::default().with_hwaccel(accel));
            let args = compositor.build_args(&job(&timeline, &bed, &out));
            assert!(!args.contains(&"-hwaccel".to_string()), "{accel}: {args:?}");
            let c = args.iter().position(|a| a == "-c:v").unwrap();
            assert_eq!(args[c + 1], compositor.config().video_codec);
        }
    }

    #[test]
    fn test_inputs_per_clip_and_background_loop() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let compositor = FfmpegCompositor::default();
        let spans = frame_grid(timeline.clips().iter().map(RenderClip::duration), 24, 44_100);

        let (args, indices, bg) = compositor.build_inputs(&timeline, &bed, &spans, 24);
        // slide (image + narration), transition, slide, background
        assert_eq!(indices, vec![(0, Some(1)), (2, None), (3, Some(4))]);
        assert_eq!(bg, Some(5));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 6);

        // Stills are read at the output rate with one spare frame: 19 + 1 at 24fps
        let still = args.iter().position(|a| a == "-framerate").unwrap();
        assert_eq!(args[still + 1], "24");
        assert_eq!(args[still + 3], "0.833333");

        // 2.3s of video from a 1.2s bed: two plays, so one extra loop
        let pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[pos + 1], "1");
        assert_eq!(args[pos + 3], "/music/bg.mp3");
    }

    #[test]
    fn test_filter_graph_shapes() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let compositor = FfmpegCompositor::with_config(
            CompositorConfig::default().with_background_volume(0.3),
        );
        let graph = graph(&compositor, &timeline, &bed);

        // 0.8s, 1.0s, 0.5s end on frames 19, 43 and 55
        assert!(graph.contains("[0:v]scale=1280:720,setsar=1,fps=24"));
        assert!(graph.contains("trim=end_frame=19,"));
        assert!(graph.contains("[1:a]aresample=44100"));
        assert!(graph.contains("apad,atrim=end_sample=34913,"));
        assert!(graph.contains("tpad=stop_mode=clone:stop=2,trim=end_frame=24,"));
        assert!(graph.contains("trim=end_frame=12,"));
        assert!(graph.contains("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1"));
        assert!(graph.contains("atrim=duration=2.300000"));
        assert!(graph.contains("volume=0.3[bed]"));
        assert!(graph.contains("normalize=0[aout]"));
    }

    #[test]
    fn test_silent_transition_gets_generated_silence() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let graph = graph(&FfmpegCompositor::default(), &timeline, &bed);

        // 19..43 is 24 frames, 34913..79013 samples
        assert!(graph.contains("anullsrc=r=44100:cl=stereo,aresample=44100"));
        assert!(graph.contains("atrim=end_sample=44100[a1]"));
        assert!(!graph.contains("[2:a]"));
    }

    #[test]
    fn test_transition_soundtrack_is_kept() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = build(
            &dir,
            vec![segment(0, "1", 0, 800), segment(1, "2", 0, 500)],
            true,
        );
        let compositor = FfmpegCompositor::default();
        let spans = frame_grid(timeline.clips().iter().map(RenderClip::duration), 24, 44_100);
        let (_, indices, _) = compositor.build_inputs(&timeline, &bed, &spans, 24);
        assert_eq!(indices[1], (2, Some(2)));

        let graph = graph(&compositor, &timeline, &bed);
        assert!(!graph.contains("anullsrc"));
        assert!(graph.contains(
            "[2:a]aresample=44100,aformat=sample_fmts=fltp:channel_layouts=stereo,apad,atrim=end_sample=44100,asetpts=PTS-STARTPTS[a1]"
        ));
    }

    #[test]
    fn test_clip_lengths_add_up_to_output_length() {
        let dir = TempDir::new().unwrap();
        // 0.8 + 0.6 in group 1, 1s transition, 0.5 in group 2
        let (timeline, bed) = build(
            &dir,
            vec![segment(0, "1", 0, 800), segment(0, "1", 1, 600), segment(1, "2", 0, 500)],
            false,
        );
        let compositor = FfmpegCompositor::default();
        let out = PathBuf::from("/scratch/render.mp4");
        let args = compositor.build_args(&job(&timeline, &bed, &out));
        let graph = args.iter().find(|a| a.contains("concat=")).unwrap();

        let frames = values_after(graph, ",trim=end_frame=");
        assert_eq!(frames, vec![19, 15, 24, 12]);
        let samples = values_after(graph, "atrim=end_sample=");
        assert_eq!(samples.iter().sum::<u64>(), 128_625);

        // Output is cut exactly where the last clip ends, 70 frames at 24fps
        let t = args.iter().rposition(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "2.916667");
        let total: u64 = frames.iter().sum();
        assert_eq!(args[t + 1], secs(grid_duration(total, 24)));
        assert_eq!(u128::from(samples.iter().sum::<u64>()) * 24, u128::from(total) * 44_100);
    }

    #[test]
    fn test_frame_grid_does_not_drift() {
        // 1.2 frames each: rounding every clip up would give 200 frames, not 120
        let spans = frame_grid(
            std::iter::repeat(Duration::from_millis(50)).take(100),
            24,
            48_000,
        );
        assert!(spans.iter().all(|s| s.frames == 1 || s.frames == 2));
        let total: u64 = spans.iter().map(|s| s.frames).sum();
        assert_eq!(total, 120);
        assert_eq!(spans.iter().map(|s| s.samples).sum::<u64>(), 240_000);

        let spans = frame_grid(
            [Duration::from_millis(2000), Duration::from_millis(10), Duration::from_millis(990)],
            24,
            48_000,
        );
        let frames: Vec<_> = spans.iter().map(|s| s.frames).collect();
        // The 10ms clip still gets a frame; the next one absorbs it
        assert_eq!(frames, vec![48, 1, 23]);
        assert_eq!(spans.iter().map(|s| s.samples).sum::<u64>(), 144_000);
    }

    #[test]
    fn test_build_args_output_and_canvas() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let compositor = FfmpegCompositor::with_config(CompositorConfig::fast());
        let out = PathBuf::from("/scratch/render.mp4");
        let canvas = Canvas {
            width: 640,
            height: 360,
            frame_rate: 30,
        };
        let args = compositor.build_args(&RenderJob {
            canvas,
            ..job(&timeline, &bed, &out)
        });

        assert_eq!(args.last().unwrap(), "/scratch/render.mp4");
        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&"[vout]".to_string()));
        assert!(args.contains(&"ultrafast".to_string()));
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "30");
        let graph = args.iter().find(|a| a.contains("concat=")).unwrap();
        assert!(graph.contains("scale=640:360"));
        // 2.3s lands on a whole frame at 30fps
        let t = args.iter().rposition(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "2.300000");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let mut tail = VecDeque::new();
        for i in 0..20 {
            push_tail(&mut tail, format!("line {i}"));
        }
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        let joined = join_tail(&tail);
        assert!(joined.starts_with("line 8 | line 9"));
        assert!(joined.ends_with("line 19"));
    }

    #[test]
    fn test_secs_format() {
        assert_eq!(secs(Duration::from_millis(2900)), "2.900000");
        assert_eq!(secs(Duration::ZERO), "0.000000");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_missing_dependency() {
        let dir = TempDir::new().unwrap();
        let (timeline, bed) = fixture(&dir);
        let compositor = FfmpegCompositor::with_config(CompositorConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..CompositorConfig::default()
        });
        let out = dir.path().join("out.mp4");
        let err = compositor.render(job(&timeline, &bed, &out)).await.unwrap_err();
        assert!(matches!(err, SlideshowError::MissingDependency(_)));
        assert!(!out.exists());
    }
}
