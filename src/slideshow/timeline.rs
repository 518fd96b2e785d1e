//! Timeline assembly from synthesized narration
//!
//! Orders speech segments by their composite key, pairs each with its unit's
//! image, and inserts a transition clip wherever the group changes.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{
    as_secs, AssetKind, AudioAsset, CaptionUnit, Result, SegmentKey, SlideshowError,
    SpeechSegment, TransitionAsset,
};

/// A single renderable clip on the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderClip {
    /// Still image held for exactly the length of its narration
    Slide {
        key: SegmentKey,
        group_id: String,
        image: PathBuf,
        narration: AudioAsset,
    },
    /// Transition video at its own intrinsic length, no narration
    Transition {
        path: PathBuf,
        #[serde(serialize_with = "as_secs")]
        duration: Duration,
        /// Play the transition's own soundtrack instead of silence
        has_audio: bool,
    },
}

impl RenderClip {
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Slide { narration, .. } => narration.duration,
            Self::Transition { duration, .. } => *duration,
        }
    }

    #[must_use]
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Transition { .. })
    }

    /// Group of a slide clip; transitions belong to no group.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Slide { group_id, .. } => Some(group_id),
            Self::Transition { .. } => None,
        }
    }

    /// Image or video shown for this clip
    #[must_use]
    pub fn visual(&self) -> &Path {
        match self {
            Self::Slide { image, .. } => image,
            Self::Transition { path, .. } => path,
        }
    }

    /// Narration audio, if any
    #[must_use]
    pub fn narration(&self) -> Option<&Path> {
        match self {
            Self::Slide { narration, .. } => Some(&narration.path),
            Self::Transition { .. } => None,
        }
    }
}

/// Ordered sequence of clips, played back-to-back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    clips: Vec<RenderClip>,
}

impl Timeline {
    #[must_use]
    pub fn clips(&self) -> &[RenderClip] {
        &self.clips
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Sum of every clip's duration, transitions included
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.clips.iter().map(RenderClip::duration).sum()
    }

    /// Sum of narration only
    #[must_use]
    pub fn narration_duration(&self) -> Duration {
        self.clips
            .iter()
            .filter(|c| !c.is_transition())
            .map(RenderClip::duration)
            .sum()
    }

    #[must_use]
    pub fn slide_count(&self) -> usize {
        self.clips.iter().filter(|c| !c.is_transition()).count()
    }

    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.clips.iter().filter(|c| c.is_transition()).count()
    }
}

/// Sort segments into playback order.
pub fn order_segments(segments: &mut [SpeechSegment]) {
    segments.sort_by_key(SpeechSegment::key);
}

/// Number of adjacent pairs with differing groups. Expects playback order.
#[must_use]
pub fn count_group_boundaries(segments: &[SpeechSegment]) -> usize {
    segments
        .windows(2)
        .filter(|pair| pair[0].group_id != pair[1].group_id)
        .count()
}

/// Assembles a [`Timeline`] from caption units and their synthesized speech
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    transition: Option<TransitionAsset>,
}

impl TimelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition clip to place at group boundaries
    #[must_use]
    pub fn with_transition(mut self, transition: TransitionAsset) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Build the timeline.
    ///
    /// Segments may arrive in any order; playback order is the composite
    /// [`SegmentKey`]. Each segment's group comes from the unit it points to.
    ///
    /// # Errors
    ///
    /// - [`SlideshowError::EmptyInput`] if there are no segments
    /// - [`SlideshowError::MissingAsset`] if a used image is not a file, or a
    ///   group boundary exists and no usable transition was configured
    pub fn build(
        &self,
        units: &[CaptionUnit],
        mut segments: Vec<SpeechSegment>,
    ) -> Result<Timeline> {
        if segments.is_empty() {
            return Err(SlideshowError::EmptyInput);
        }

        order_segments(&mut segments);

        let mut clips = Vec::with_capacity(segments.len() * 2);
        let mut previous_group: Option<&str> = None;
        let mut resolved_images = vec![false; units.len()];

        for segment in segments {
            let unit = units.get(segment.unit_index).ok_or_else(|| {
                SlideshowError::InvalidAsset(format!(
                    "speech segment refers to unknown caption unit {}",
                    segment.unit_index
                ))
            })?;

            if !resolved_images[segment.unit_index] {
                if !unit.image.is_file() {
                    return Err(SlideshowError::missing(AssetKind::Image, &unit.image));
                }
                resolved_images[segment.unit_index] = true;
            }

            if previous_group.is_some_and(|prev| prev != unit.group_id) {
                clips.push(self.transition_clip()?);
            }
            previous_group = Some(&unit.group_id);

            clips.push(RenderClip::Slide {
                key: segment.key(),
                group_id: unit.group_id.clone(),
                image: unit.image.clone(),
                narration: segment.audio,
            });
        }

        let timeline = Timeline { clips };
        debug!(
            "Assembled timeline: {} slides, {} transitions, {:.3}s",
            timeline.slide_count(),
            timeline.transition_count(),
            timeline.total_duration().as_secs_f64()
        );

        Ok(timeline)
    }

    fn transition_clip(&self) -> Result<RenderClip> {
        let transition = self.transition.as_ref().ok_or(SlideshowError::MissingAsset {
            kind: AssetKind::Transition,
            reference: "<not configured>".to_string(),
        })?;

        if !transition.path.is_file() {
            return Err(SlideshowError::missing(AssetKind::Transition, &transition.path));
        }

        Ok(RenderClip::Transition {
            path: transition.path.clone(),
            duration: transition.duration,
            has_audio: transition.has_audio,
        })
    }
}
