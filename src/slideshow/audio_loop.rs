//! Background bed sized to the timeline
//!
//! The source track is repeated whole and the last copy is cut short, so the
//! bed ends exactly when the video does. Durations are integer nanoseconds
//! ([`Duration`]), which keeps the accumulated length exact.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{as_secs, AudioAsset, Result, SlideshowError};

/// Pieces to take from the start of the source, in playback order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopPlan {
    #[serde(serialize_with = "as_secs")]
    source_duration: Duration,
    #[serde(serialize_with = "as_secs")]
    target: Duration,
    #[serde(serialize_with = "serialize_pieces")]
    pieces: Vec<Duration>,
}

impl LoopPlan {
    /// Each entry is a prefix of the source of that length
    #[must_use]
    pub fn pieces(&self) -> &[Duration] {
        &self.pieces
    }

    /// Number of times playback starts from the top of the source
    #[must_use]
    pub fn repetitions(&self) -> usize {
        self.pieces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    #[must_use]
    pub fn source_duration(&self) -> Duration {
        self.source_duration
    }

    #[must_use]
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Length of the looped output
    #[must_use]
    pub fn total(&self) -> Duration {
        self.pieces.iter().sum()
    }

    /// Length of the final piece if it is shorter than the source
    #[must_use]
    pub fn partial_tail(&self) -> Option<Duration> {
        self.pieces
            .last()
            .copied()
            .filter(|last| *last < self.source_duration)
    }
}

/// A looped background track ready for mixing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundTrack {
    source: PathBuf,
    plan: LoopPlan,
}

impl BackgroundTrack {
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn plan(&self) -> &LoopPlan {
        &self.plan
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.plan.total()
    }
}

/// Builds exact-length loops of a source track
pub struct AudioLoopBuilder;

impl AudioLoopBuilder {
    /// Plan a loop of `source_duration` out to exactly `target`.
    ///
    /// # Errors
    ///
    /// [`SlideshowError::InvalidAsset`] if the source is empty and the target
    /// is not.
    pub fn plan(source_duration: Duration, target: Duration) -> Result<LoopPlan> {
        let mut pieces = Vec::new();

        if !target.is_zero() {
            if source_duration.is_zero() {
                return Err(SlideshowError::InvalidAsset(format!(
                    "cannot loop a zero-length source to {:.3}s",
                    target.as_secs_f64()
                )));
            }

            let mut current = Duration::ZERO;
            while current < target {
                let piece = source_duration.min(target - current);
                pieces.push(piece);
                current += piece;
            }
        }

        Ok(LoopPlan {
            source_duration,
            target,
            pieces,
        })
    }

    /// Loop `source` to exactly `target`.
    ///
    /// # Errors
    ///
    /// Same as [`AudioLoopBuilder::plan`].
    pub fn build(source: &AudioAsset, target: Duration) -> Result<BackgroundTrack> {
        let plan = Self::plan(source.duration, target)?;

        debug!(
            "Background loop: {:.3}s source x{} -> {:.3}s",
            source.duration.as_secs_f64(),
            plan.repetitions(),
            plan.total().as_secs_f64()
        );

        Ok(BackgroundTrack {
            source: source.path.clone(),
            plan,
        })
    }
}

fn serialize_pieces<S: serde::Serializer>(
    pieces: &[Duration],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(pieces.iter().map(Duration::as_secs_f64))
}
