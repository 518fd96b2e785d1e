//! `slidecast` CLI - render narrated slideshows from a manifest

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use slidecast::config::Config;
use slidecast::TtsEngine;

#[derive(Parser)]
#[command(name = "slidecast")]
#[command(about = "Turn captioned images into a narrated slideshow video")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/slidecast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize, assemble and encode a slideshow
    Render {
        /// Manifest file (JSON or TOML)
        manifest: PathBuf,

        /// Output video file
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Canvas width
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height
        #[arg(long)]
        height: Option<u32>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Concurrent TTS calls
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Keep the run's scratch directory
        #[arg(long)]
        keep_scratch: bool,

        #[command(flatten)]
        speech: SpeechArgs,

        /// Use hardware encoding (VideoToolbox on macOS, NVENC elsewhere)
        #[arg(long)]
        hwaccel: bool,
    },

    /// Show the timeline and background loop without encoding
    Plan {
        /// Manifest file (JSON or TOML)
        manifest: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        speech: SpeechArgs,
    },

    /// Check that ffmpeg, ffprobe and the TTS engine are installed
    Check {
        #[command(flatten)]
        speech: SpeechArgs,
    },
}

#[derive(clap::Args)]
struct SpeechArgs {
    /// TTS engine
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,

    /// Speech language (e.g. en, fi)
    #[arg(long)]
    language: Option<String>,
}

impl SpeechArgs {
    fn apply(self, config: &mut Config) {
        if let Some(engine) = self.engine {
            config.speech.engine = engine.into();
            // A binary configured for another engine doesn't carry over
            config.speech.binary = None;
        }
        if let Some(language) = self.language {
            config.speech.language = language;
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineArg {
    /// gtts-cli (online, mp3)
    Gtts,
    /// espeak-ng (offline, wav)
    Espeak,
}

impl From<EngineArg> for TtsEngine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Gtts => TtsEngine::Gtts,
            EngineArg::Espeak => TtsEngine::Espeak,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            manifest,
            output,
            width,
            height,
            fps,
            concurrency,
            keep_scratch,
            speech,
            hwaccel,
        } => {
            speech.apply(&mut config);
            if let Some(width) = width {
                config.canvas.width = width;
            }
            if let Some(height) = height {
                config.canvas.height = height;
            }
            if let Some(fps) = fps {
                config.canvas.frame_rate = fps;
            }
            if let Some(concurrency) = concurrency {
                config.run.synthesis_concurrency = concurrency;
            }
            config.run.keep_scratch |= keep_scratch;
            if hwaccel {
                let accel = if cfg!(target_os = "macos") { "videotoolbox" } else { "nvenc" };
                config.render.hwaccel = Some(accel.to_string());
            }
            cmd::render::cmd_render(&config, &manifest, &output).await?;
        }
        Commands::Plan {
            manifest,
            json,
            speech,
        } => {
            speech.apply(&mut config);
            cmd::plan::cmd_plan(&config, &manifest, json).await?;
        }
        Commands::Check { speech } => {
            speech.apply(&mut config);
            cmd::check::cmd_check(&config).await?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
