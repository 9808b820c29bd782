//! Thumbnailer configuration.
//!
//! [`ThumbnailerConfig`] is a builder that carries the operational settings
//! of a [`Thumbnailer`](crate::Thumbnailer): the default sampling plan,
//! output quality, time budget, resize policy, worker count, title font and
//! progress callback. Per-request choices (prompt, timestamp, geometry,
//! overlay) live on [`ThumbnailRequest`](crate::ThumbnailRequest) instead.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use clip_thumbnailer::{SampleSpec, ThumbnailerConfig};
//!
//! let config = ThumbnailerConfig::new()
//!     .with_sample_spec(SampleSpec::new(16))
//!     .with_jpeg_quality(85)
//!     .with_request_timeout(Duration::from_secs(30));
//! assert_eq!(config.jpeg_quality(), 85);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::{
    compositor::ResizePolicy,
    output::DEFAULT_JPEG_QUALITY,
    overlay::TitleFont,
    progress::{NoOpProgress, ProgressCallback},
    sampler::SampleSpec,
};

/// Time budget of one request when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Operational settings for a [`Thumbnailer`](crate::Thumbnailer).
///
/// All fields have defaults; `ThumbnailerConfig::new()` is a working
/// configuration without a title font.
#[derive(Clone)]
pub struct ThumbnailerConfig {
    pub(crate) sample_spec: SampleSpec,
    pub(crate) jpeg_quality: u8,
    pub(crate) request_timeout: Duration,
    pub(crate) resize_policy: ResizePolicy,
    pub(crate) worker_threads: Option<usize>,
    pub(crate) font: Option<TitleFont>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

impl Debug for ThumbnailerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ThumbnailerConfig")
            .field("sample_spec", &self.sample_spec)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("request_timeout", &self.request_timeout)
            .field("resize_policy", &self.resize_policy)
            .field("worker_threads", &self.worker_threads)
            .field("has_font", &self.font.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ThumbnailerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailerConfig {
    /// Default settings: 12 candidates, JPEG quality 90, 60 s timeout, cover
    /// resizing, one worker per CPU core, no font, no progress reporting.
    pub fn new() -> Self {
        Self {
            sample_spec: SampleSpec::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            resize_policy: ResizePolicy::Cover,
            worker_threads: None,
            font: None,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Default sampling plan. A request's own sample count overrides the
    /// count but keeps these margins.
    #[must_use]
    pub fn with_sample_spec(mut self, spec: SampleSpec) -> Self {
        self.sample_spec = spec;
        self
    }

    /// JPEG quality, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Wall-clock budget per request. Zero is raised to one millisecond.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Resize policy. [`ResizePolicy::Cover`] unless set.
    #[must_use]
    pub fn with_resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize_policy = policy;
        self
    }

    /// Number of concurrent blocking jobs. Defaults to the CPU count;
    /// clamped to a minimum of 1.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    /// Font used for title overlays.
    #[must_use]
    pub fn with_font(mut self, font: TitleFont) -> Self {
        self.font = Some(font);
        self
    }

    /// Attach a progress callback, invoked from worker threads.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Default sampling plan.
    pub fn sample_spec(&self) -> &SampleSpec {
        &self.sample_spec
    }

    /// JPEG quality.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Per-request time budget.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Resize policy.
    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize_policy
    }
}
