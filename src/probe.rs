//! Lightweight video probing.
//!
//! [`probe`] opens a source through any [`MediaBackend`], reads container
//! metadata, and closes it again without decoding a single frame.

use crate::{
    error::ThumbnailError,
    metadata::VideoInfo,
    source::{MediaBackend, VideoSource},
};

/// Probe a video source and return its metadata.
///
/// A missing or zero duration is not an error: the returned [`VideoInfo`]
/// has `duration_known == false` and the source is treated as a single-frame
/// video downstream.
///
/// # Errors
///
/// [`ThumbnailError::UnreadableMedia`] if the source cannot be opened or its
/// metadata cannot be parsed.
///
/// # Example
///
/// ```no_run
/// use clip_thumbnailer::{FfmpegBackend, VideoSource, probe};
///
/// let info = probe(&FfmpegBackend::new(), &VideoSource::parse("https://example.com/clip.mp4"))?;
/// println!("{:?}", info);
/// # Ok::<(), clip_thumbnailer::ThumbnailError>(())
/// ```
pub fn probe(backend: &dyn MediaBackend, source: &VideoSource) -> Result<VideoInfo, ThumbnailError> {
    let reader = backend.open(source)?;
    Ok(reader.info().clone())
}
