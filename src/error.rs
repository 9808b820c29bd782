//! Error types for the `clip_thumbnailer` crate.
//!
//! [`ThumbnailError`] is the single error type returned by every fallible
//! operation. Its variants follow the failure taxonomy of the thumbnail
//! pipeline: caller mistakes, unreadable media, empty sampling results,
//! an unavailable similarity model, internal encoding failures, and delivery
//! failures. [`ErrorKind`] flattens them into a `Copy` value for callers that
//! only need to branch on the category (HTTP status mapping, exit codes).

use std::{io::Error as IoError, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all thumbnail operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ThumbnailError {
    /// The request was malformed or contradictory. Retrying will not help.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The video source could not be opened, probed, or decoded.
    #[error("Unreadable media {source_name}: {reason}")]
    UnreadableMedia {
        /// Path or URL of the source.
        source_name: String,
        /// Underlying reason.
        reason: String,
    },

    /// A single frame could not be decoded. The sampler recovers from this
    /// locally; it only escapes the crate on the explicit-timestamp path.
    #[error("Failed to decode video frame: {0}")]
    VideoDecode(String),

    /// Sampling produced no usable candidate frame.
    #[error("No frames could be extracted ({attempted} timestamps attempted)")]
    NoFramesExtracted {
        /// Number of timestamps that were tried.
        attempted: usize,
    },

    /// The similarity model could not be loaded or queried.
    #[error("Similarity scoring unavailable ({0}); supply an explicit timestamp instead")]
    ScoringUnavailable(String),

    /// The output buffer could not be encoded. Indicates a bug upstream.
    #[error("Failed to encode thumbnail: {0}")]
    Encoding(String),

    /// The delivery backend rejected or failed to store the image.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The request exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A blocking worker job panicked or was aborted.
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Invalid configuration (bad font file, missing credentials, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

/// Coarse category of a [`ThumbnailError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller error; do not retry.
    InvalidRequest,
    /// The media could not be read (includes sampling that yielded nothing).
    Media,
    /// Similarity scoring is unavailable; retry with an explicit timestamp.
    ScoringUnavailable,
    /// The delivery backend failed.
    Delivery,
    /// The request ran out of time.
    Timeout,
    /// Everything else: internal failures and bugs.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase identifier, used in JSON error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Media => "unreadable_media",
            ErrorKind::ScoringUnavailable => "scoring_unavailable",
            ErrorKind::Delivery => "delivery",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl ThumbnailError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThumbnailError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ThumbnailError::UnreadableMedia { .. }
            | ThumbnailError::VideoDecode(_)
            | ThumbnailError::NoFramesExtracted { .. } => ErrorKind::Media,
            ThumbnailError::ScoringUnavailable(_) => ErrorKind::ScoringUnavailable,
            ThumbnailError::Delivery(_) => ErrorKind::Delivery,
            ThumbnailError::Timeout(_) => ErrorKind::Timeout,
            ThumbnailError::Encoding(_)
            | ThumbnailError::Cancelled
            | ThumbnailError::Worker(_)
            | ThumbnailError::Configuration(_)
            | ThumbnailError::Io(_)
            | ThumbnailError::Image(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the caller can recover by resubmitting the request with
    /// an explicit timestamp instead of a prompt.
    pub fn requires_explicit_timestamp(&self) -> bool {
        matches!(self, ThumbnailError::ScoringUnavailable(_))
    }

    /// Re-tag a model failure as [`ThumbnailError::ScoringUnavailable`],
    /// keeping its message.
    pub(crate) fn into_scoring_unavailable(self) -> Self {
        match self {
            ThumbnailError::ScoringUnavailable(_) => self,
            other => ThumbnailError::ScoringUnavailable(other.to_string()),
        }
    }

    pub(crate) fn unreadable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ThumbnailError::UnreadableMedia {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<FfmpegError> for ThumbnailError {
    fn from(error: FfmpegError) -> Self {
        ThumbnailError::VideoDecode(error.to_string())
    }
}

impl From<tokio::task::JoinError> for ThumbnailError {
    fn from(error: tokio::task::JoinError) -> Self {
        ThumbnailError::Worker(error.to_string())
    }
}

impl From<reqwest::Error> for ThumbnailError {
    fn from(error: reqwest::Error) -> Self {
        ThumbnailError::Delivery(error.to_string())
    }
}
