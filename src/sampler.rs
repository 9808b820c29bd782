//! Candidate frame sampling.
//!
//! The sampler turns a duration and a [`SampleSpec`] into an evenly spaced,
//! deterministic list of timestamps ([`sample_timestamps`]), then extracts
//! one frame per timestamp ([`sample`]). Frames that fail to decode are
//! logged and dropped; only an entirely empty result is an error.
//!
//! # Example
//!
//! ```
//! use clip_thumbnailer::{Margin, SampleSpec, sample_timestamps};
//!
//! let spec = SampleSpec::new(5).with_margins(Margin::Fraction(0.0), Margin::Fraction(0.0));
//! assert_eq!(sample_timestamps(10.0, &spec), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
//! ```

use std::sync::Arc;

use image::RgbImage;

use crate::{
    error::ThumbnailError,
    progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker, Stage},
    source::FrameReader,
};

/// Default number of candidates per video.
pub const DEFAULT_SAMPLE_COUNT: usize = 12;

/// Upper bound on candidates per request.
pub const MAX_SAMPLE_COUNT: usize = 120;

/// How much of the start or end of a video to keep out of sampling.
///
/// Fades, slates and end cards live there, and decoders are least reliable
/// right at the stream boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Margin {
    /// A fraction of the duration (`0.02` = 2 %).
    Fraction(f64),
    /// An absolute number of seconds.
    Seconds(f64),
    /// Whichever is larger of an absolute floor and a fraction.
    AtLeast {
        /// Absolute floor in seconds.
        seconds: f64,
        /// Fraction of the duration.
        fraction: f64,
    },
}

impl Margin {
    /// Resolve to seconds for a video of `duration` seconds, clamped into
    /// `[0, duration]`.
    pub fn resolve(self, duration: f64) -> f64 {
        let seconds = match self {
            Margin::Fraction(fraction) => duration * fraction,
            Margin::Seconds(seconds) => seconds,
            Margin::AtLeast { seconds, fraction } => seconds.max(duration * fraction),
        };
        if seconds.is_finite() {
            seconds.clamp(0.0, duration.max(0.0))
        } else {
            0.0
        }
    }
}

impl Default for Margin {
    fn default() -> Self {
        Margin::AtLeast {
            seconds: 0.5,
            fraction: 0.02,
        }
    }
}

/// Parameters governing candidate generation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct SampleSpec {
    /// Number of candidates, at least 1.
    pub count: usize,
    /// Excluded leading span.
    pub start_margin: Margin,
    /// Excluded trailing span.
    pub end_margin: Margin,
}

impl SampleSpec {
    /// A spec with `count` candidates (clamped to `1..=MAX_SAMPLE_COUNT`) and
    /// the default margins.
    pub fn new(count: usize) -> Self {
        Self {
            count: count.clamp(1, MAX_SAMPLE_COUNT),
            start_margin: Margin::default(),
            end_margin: Margin::default(),
        }
    }

    /// Replace both margins.
    pub fn with_margins(mut self, start: Margin, end: Margin) -> Self {
        self.start_margin = start;
        self.end_margin = end;
        self
    }

    /// Replace the candidate count.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.clamp(1, MAX_SAMPLE_COUNT);
        self
    }

    /// The usable interval `[start, end]` in seconds for `duration`, or
    /// `None` when the margins leave nothing.
    pub fn interval(&self, duration: f64) -> Option<(f64, f64)> {
        if !(duration.is_finite() && duration > 0.0) {
            return None;
        }
        let start = self.start_margin.resolve(duration);
        let end = duration - self.end_margin.resolve(duration);
        (end > start).then_some((start, end))
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT)
    }
}

/// One extracted frame under consideration.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Requested position in seconds.
    pub timestamp: f64,
    /// Decoded frame at source resolution.
    pub image: RgbImage,
    /// Similarity score once scored; higher is a better match.
    pub score: Option<f32>,
}

impl Candidate {
    /// An unscored candidate.
    pub fn new(timestamp: f64, image: RgbImage) -> Self {
        Self {
            timestamp,
            image,
            score: None,
        }
    }
}

/// Compute the candidate timestamps for a video of `duration` seconds.
///
/// A pure function of `duration` and `spec`: evenly spaced over the usable
/// interval, both ends included when more than one candidate is requested,
/// the interval midpoint when exactly one is. When the margins leave no
/// interval (very short or zero-length videos) the count collapses to one
/// timestamp at the midpoint of the video.
pub fn sample_timestamps(duration: f64, spec: &SampleSpec) -> Vec<f64> {
    let Some((start, end)) = spec.interval(duration) else {
        let midpoint = if duration.is_finite() && duration > 0.0 {
            duration / 2.0
        } else {
            0.0
        };
        return vec![midpoint];
    };

    let count = spec.count.max(1);
    if count == 1 {
        return vec![start + (end - start) / 2.0];
    }

    let step = (end - start) / (count - 1) as f64;
    let mut timestamps: Vec<f64> = (0..count)
        .map(|index| (start + step * index as f64).min(end))
        .collect();
    // Pin the last sample so floating-point drift never moves it off the end.
    if let Some(last) = timestamps.last_mut() {
        *last = end;
    }
    timestamps
}

/// Extract candidates at the timestamps [`sample_timestamps`] plans for the
/// reader's video.
///
/// Candidates are returned in timestamp order. Frames that fail to decode are
/// skipped with a warning.
///
/// # Errors
///
/// [`ThumbnailError::NoFramesExtracted`] if every extraction failed,
/// [`ThumbnailError::Cancelled`] if `cancel` fires.
pub fn sample(
    reader: &mut dyn FrameReader,
    spec: &SampleSpec,
    cancel: &CancellationToken,
) -> Result<Vec<Candidate>, ThumbnailError> {
    sample_with_progress(reader, spec, cancel, Arc::new(NoOpProgress))
}

/// Like [`sample`], reporting each attempted timestamp to `progress`.
pub fn sample_with_progress(
    reader: &mut dyn FrameReader,
    spec: &SampleSpec,
    cancel: &CancellationToken,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<Candidate>, ThumbnailError> {
    let info = reader.info().clone();
    let timestamps = sample_timestamps(info.duration_seconds, spec);
    log::debug!(
        "Sampling {} candidates from {:.3}s of video: {:?}",
        timestamps.len(),
        info.duration_seconds,
        timestamps
    );

    let mut tracker = ProgressTracker::new(progress, Stage::Sampling, Some(timestamps.len() as u64));
    let mut candidates = Vec::with_capacity(timestamps.len());

    for &timestamp in &timestamps {
        if cancel.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }
        match reader.frame_at(timestamp, cancel) {
            Ok(image) if image.dimensions() == (info.width, info.height) => {
                candidates.push(Candidate::new(timestamp, image));
            }
            Ok(image) => {
                log::warn!(
                    "Dropping frame at {timestamp:.3}s: got {:?}, expected {}x{}",
                    image.dimensions(),
                    info.width,
                    info.height
                );
            }
            Err(ThumbnailError::Cancelled) => return Err(ThumbnailError::Cancelled),
            Err(error) => log::warn!("Dropping frame at {timestamp:.3}s: {error}"),
        }
        tracker.advance(Some(timestamp));
    }

    if candidates.is_empty() {
        return Err(ThumbnailError::NoFramesExtracted {
            attempted: timestamps.len(),
        });
    }
    Ok(candidates)
}
