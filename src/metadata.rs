//! Probe results for a video source.
//!
//! [`VideoInfo`] is what the prober reports about a source before any frame
//! is decoded: duration and pixel dimensions, plus the frame rate and codec
//! for diagnostics. It is immutable once produced.

use serde::Serialize;

/// Metadata of a probed video source.
///
/// # Example
///
/// ```no_run
/// use clip_thumbnailer::{FfmpegBackend, VideoSource, probe};
///
/// let info = probe(&FfmpegBackend::new(), &VideoSource::parse("input.mp4"))?;
/// println!("{}x{}, {:.2}s", info.width, info.height, info.duration_seconds);
/// # Ok::<(), clip_thumbnailer::ThumbnailError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct VideoInfo {
    /// Duration in seconds. Zero when the container does not report one.
    pub duration_seconds: f64,
    /// `false` when the duration was missing or non-positive and the prober
    /// fell back to treating the source as a single-frame video.
    pub duration_known: bool,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frames per second, `0.0` if unknown.
    pub frames_per_second: f64,
    /// Codec name (e.g. `"h264"`), `"unknown"` if unavailable.
    pub codec: String,
}

impl VideoInfo {
    /// Build probe metadata, normalising a missing or bogus duration.
    ///
    /// Negative, NaN and infinite durations are all treated as unknown.
    pub fn new(duration_seconds: f64, width: u32, height: u32) -> Self {
        let duration_known = duration_seconds.is_finite() && duration_seconds > 0.0;
        Self {
            duration_seconds: if duration_known { duration_seconds } else { 0.0 },
            duration_known,
            width,
            height,
            frames_per_second: 0.0,
            codec: "unknown".to_string(),
        }
    }

    /// Attach frame rate and codec name.
    pub fn with_stream_details(mut self, frames_per_second: f64, codec: impl Into<String>) -> Self {
        self.frames_per_second = if frames_per_second.is_finite() {
            frames_per_second.max(0.0)
        } else {
            0.0
        };
        self.codec = codec.into();
        self
    }

    /// Clamp a requested timestamp into the accessible range of the video.
    ///
    /// With an unknown duration only the lower bound applies; the decoder
    /// falls back to the last frame it can reach.
    pub fn clamp_timestamp(&self, seconds: f64) -> f64 {
        if self.duration_known {
            seconds.clamp(0.0, self.duration_seconds)
        } else {
            seconds.max(0.0)
        }
    }
}
