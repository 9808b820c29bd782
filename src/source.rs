//! Video sources and the decoding capability the pipeline depends on.
//!
//! The pipeline never talks to FFmpeg directly. It asks a [`MediaBackend`]
//! to open a [`VideoSource`], receives a [`FrameReader`], and pulls probe
//! metadata and still frames from it. [`FfmpegBackend`](crate::FfmpegBackend)
//! is the production implementation; tests substitute synthetic ones.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use image::RgbImage;

use crate::{error::ThumbnailError, metadata::VideoInfo, progress::CancellationToken};

/// Where a video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// A file on local disk.
    Path(PathBuf),
    /// A remote stream FFmpeg can open directly (`http://`, `https://`, ...).
    Url(String),
}

impl VideoSource {
    /// Interpret a user-supplied string: anything with a `scheme://` prefix
    /// is a URL, everything else a path.
    pub fn parse(input: &str) -> Self {
        if input.contains("://") {
            VideoSource::Url(input.to_string())
        } else {
            VideoSource::Path(PathBuf::from(input))
        }
    }

    /// The string handed to the demuxer.
    pub fn location(&self) -> String {
        match self {
            VideoSource::Path(path) => path.display().to_string(),
            VideoSource::Url(url) => url.clone(),
        }
    }
}

impl Display for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.location())
    }
}

/// Opens video sources for probing and frame extraction.
///
/// Implementations are shared across concurrent requests.
pub trait MediaBackend: Send + Sync {
    /// Open `source` and read its container metadata.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::UnreadableMedia`] if the source cannot be opened or
    /// carries no decodable video stream.
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, ThumbnailError>;
}

/// An opened video, owned by a single request.
///
/// Readers live on one worker thread for their whole life and are never
/// shared, so they need not be `Send`.
pub trait FrameReader {
    /// Probe metadata gathered when the source was opened.
    fn info(&self) -> &VideoInfo;

    /// Decode the frame nearest `seconds`.
    ///
    /// The returned image always has the probed source dimensions.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::VideoDecode`] if no frame can be produced near the
    /// position, [`ThumbnailError::Cancelled`] if `cancel` fires mid-decode.
    fn frame_at(&mut self, seconds: f64, cancel: &CancellationToken) -> Result<RgbImage, ThumbnailError>;
}
