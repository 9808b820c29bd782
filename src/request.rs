//! Thumbnail requests.
//!
//! Whether a request is answered from an explicit timestamp or by prompt
//! scoring is decided once, when the request is built, and recorded as a
//! [`FrameSelection`]. Nothing downstream re-inspects optional fields.
//!
//! [`GenerateRequest`] is the loose wire shape (every field optional, as
//! callers send it); [`GenerateRequest::into_request`] validates it into a
//! [`ThumbnailRequest`].
//!
//! # Example
//!
//! ```
//! use clip_thumbnailer::{FrameSelection, GenerateRequest};
//!
//! let raw: GenerateRequest = serde_json::from_str(
//!     r#"{"video_url": "clip.mp4", "prompt": "a dog catching a frisbee"}"#,
//! )?;
//! let request = raw.into_request()?;
//! assert!(matches!(request.selection, FrameSelection::PromptDriven { .. }));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::Deserialize;

use crate::{
    compositor::TargetGeometry,
    error::ThumbnailError,
    overlay::OverlaySpec,
    progress::CancellationToken,
    sampler::MAX_SAMPLE_COUNT,
    scorer::Prompt,
    source::VideoSource,
};

/// How the frame is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSelection {
    /// Extract the frame nearest this many seconds; no sampling or scoring.
    ExplicitTimestamp(f64),
    /// Sample candidates and pick the best match for `prompt`.
    PromptDriven {
        /// What the frame should show.
        prompt: Prompt,
        /// Candidate count; `None` uses the configured default.
        sample_count: Option<usize>,
    },
}

/// A validated request for one thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    /// The video.
    pub source: VideoSource,
    /// Frame choice strategy.
    pub selection: FrameSelection,
    /// Output size.
    pub geometry: TargetGeometry,
    /// Optional title overlay.
    pub overlay: Option<OverlaySpec>,
    /// Key prefix for delivery; `None` uses the default prefix.
    pub key_prefix: Option<String>,
    /// Cancels this request's blocking work when tripped.
    pub cancellation: CancellationToken,
}

impl ThumbnailRequest {
    /// A request for the frame nearest `seconds`.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if `seconds` is negative or not
    /// finite.
    pub fn at_timestamp(
        source: VideoSource,
        seconds: f64,
        geometry: TargetGeometry,
    ) -> Result<Self, ThumbnailError> {
        Ok(Self::with_selection(
            source,
            FrameSelection::ExplicitTimestamp(validate_timestamp(seconds)?),
            geometry,
        ))
    }

    /// A request for the frame best matching `prompt`.
    pub fn from_prompt(source: VideoSource, prompt: Prompt, geometry: TargetGeometry) -> Self {
        Self::with_selection(
            source,
            FrameSelection::PromptDriven {
                prompt,
                sample_count: None,
            },
            geometry,
        )
    }

    fn with_selection(source: VideoSource, selection: FrameSelection, geometry: TargetGeometry) -> Self {
        Self {
            source,
            selection,
            geometry,
            overlay: None,
            key_prefix: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Draw a title overlay. Blank titles are dropped.
    #[must_use]
    pub fn with_overlay(mut self, overlay: OverlaySpec) -> Self {
        self.overlay = (!overlay.title.trim().is_empty()).then_some(overlay);
        self
    }

    /// Deliver under `prefix`.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Use an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Override the candidate count of a prompt-driven request.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if `count` is 0 or above
    /// [`MAX_SAMPLE_COUNT`]. On an explicit-timestamp request the count is
    /// ignored with a warning.
    pub fn with_sample_count(mut self, count: usize) -> Result<Self, ThumbnailError> {
        let count = validate_sample_count(count)?;
        match &mut self.selection {
            FrameSelection::PromptDriven { sample_count, .. } => *sample_count = Some(count),
            FrameSelection::ExplicitTimestamp(_) => {
                log::warn!("Ignoring sample count {count}: an explicit timestamp was given");
            }
        }
        Ok(self)
    }
}

/// The request as it arrives over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    /// Local path or URL of the video.
    pub video_url: String,
    /// Description of the wanted frame.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Explicit timestamp in seconds.
    #[serde(default, alias = "timestamp")]
    pub time: Option<f64>,
    /// Overlay title.
    #[serde(default)]
    pub title: Option<String>,
    /// Output width; give both edges or neither.
    #[serde(default)]
    pub width: Option<u32>,
    /// Output height; give both edges or neither.
    #[serde(default)]
    pub height: Option<u32>,
    /// Delivery key prefix.
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Candidate count for prompt-driven requests.
    #[serde(default)]
    pub sample_count: Option<usize>,
}

impl GenerateRequest {
    /// Validate into a [`ThumbnailRequest`].
    ///
    /// A timestamp takes precedence over a prompt; the prompt is then
    /// ignored with a warning.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] for a blank source, a partial or
    /// out-of-range geometry, a bad timestamp or sample count, or when
    /// neither a timestamp nor a non-blank prompt is given.
    pub fn into_request(self) -> Result<ThumbnailRequest, ThumbnailError> {
        let location = self.video_url.trim();
        if location.is_empty() {
            return Err(ThumbnailError::InvalidRequest("video_url is required".to_string()));
        }
        let source = VideoSource::parse(location);
        let geometry = TargetGeometry::from_optional(self.width, self.height)?;
        let prompt = self.prompt.and_then(Prompt::new);

        let mut request = match (self.time, prompt) {
            (Some(seconds), prompt) => {
                if prompt.is_some() {
                    log::warn!("Both a timestamp and a prompt were given; using the timestamp");
                }
                ThumbnailRequest::at_timestamp(source, seconds, geometry)?
            }
            (None, Some(prompt)) => ThumbnailRequest::from_prompt(source, prompt, geometry),
            (None, None) => {
                return Err(ThumbnailError::InvalidRequest(
                    "either a timestamp or a prompt is required".to_string(),
                ));
            }
        };

        if let Some(count) = self.sample_count {
            request = request.with_sample_count(count)?;
        }
        if let Some(title) = self.title {
            request = request.with_overlay(OverlaySpec::new(title));
        }
        if let Some(prefix) = self.key_prefix {
            request = request.with_key_prefix(prefix);
        }
        Ok(request)
    }
}

fn validate_timestamp(seconds: f64) -> Result<f64, ThumbnailError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ThumbnailError::InvalidRequest(format!(
            "timestamp must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(seconds)
}

fn validate_sample_count(count: usize) -> Result<usize, ThumbnailError> {
    if count == 0 || count > MAX_SAMPLE_COUNT {
        return Err(ThumbnailError::InvalidRequest(format!(
            "sample_count must be between 1 and {MAX_SAMPLE_COUNT}, got {count}"
        )));
    }
    Ok(count)
}
