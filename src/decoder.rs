//! FFmpeg-backed [`MediaBackend`].
//!
//! [`FfmpegBackend`] opens a source with the demuxer, picks the best video
//! stream, and reads duration and dimensions from container and stream
//! headers only. Frames are produced on demand by [`FfmpegReader::frame_at`]:
//! seek to the nearest keyframe at or before the target, decode forward, and
//! return whichever decoded frame lies closest to the requested time.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::{
    error::ThumbnailError,
    ffmpeg::ensure_initialized,
    metadata::VideoInfo,
    progress::CancellationToken,
    source::{FrameReader, MediaBackend, VideoSource},
    utilities::{
        MICROSECONDS_PER_SECOND, frame_to_rgb_buffer, pts_to_seconds, rational_to_f64,
        seconds_to_seek_position,
    },
};

/// Production media backend using the FFmpeg libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, ThumbnailError> {
        Ok(Box::new(FfmpegReader::open(source)?))
    }
}

/// An opened FFmpeg demuxer positioned on the best video stream.
pub struct FfmpegReader {
    input_context: Input,
    video_stream_index: usize,
    info: VideoInfo,
    source_name: String,
}

impl Debug for FfmpegReader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegReader")
            .field("source", &self.source_name)
            .field("video_stream_index", &self.video_stream_index)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl FfmpegReader {
    /// Open `source` and probe its best video stream.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::UnreadableMedia`] if the demuxer cannot open the
    /// source, it has no video stream, or the stream's codec parameters
    /// cannot be read.
    pub fn open(source: &VideoSource) -> Result<Self, ThumbnailError> {
        let source_name = source.location();
        log::debug!("Opening video source: {source_name}");

        ensure_initialized()?;

        let input_context = ffmpeg_next::format::input(&source_name)
            .map_err(|error| ThumbnailError::unreadable(&source_name, error))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| ThumbnailError::unreadable(&source_name, "no video stream found"))?;
        let video_stream_index = stream.index();

        let decoder_context = CodecContext::from_parameters(stream.parameters()).map_err(|error| {
            ThumbnailError::unreadable(&source_name, format!("bad codec parameters: {error}"))
        })?;
        let decoder = decoder_context.decoder().video().map_err(|error| {
            ThumbnailError::unreadable(&source_name, format!("no video decoder: {error}"))
        })?;

        let (width, height) = (decoder.width(), decoder.height());
        if width == 0 || height == 0 {
            return Err(ThumbnailError::unreadable(
                &source_name,
                "video stream reports zero dimensions",
            ));
        }

        // Container duration first, stream duration as fallback. Some live
        // and fragmented streams report neither.
        let container_duration = input_context.duration();
        let duration_seconds = if container_duration > 0 {
            container_duration as f64 / MICROSECONDS_PER_SECOND
        } else if stream.duration() > 0 {
            pts_to_seconds(stream.duration(), stream.time_base())
        } else {
            0.0
        };

        let frames_per_second = match rational_to_f64(stream.avg_frame_rate()) {
            rate if rate > 0.0 => rate,
            _ => rational_to_f64(stream.rate()),
        };
        let codec_name = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = VideoInfo::new(duration_seconds, width, height)
            .with_stream_details(frames_per_second, codec_name);
        if !info.duration_known {
            log::warn!("{source_name} reports no usable duration; treating it as a single frame");
        }

        Ok(Self {
            input_context,
            video_stream_index,
            info,
            source_name,
        })
    }
}

impl FrameReader for FfmpegReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, seconds: f64, cancel: &CancellationToken) -> Result<RgbImage, ThumbnailError> {
        let target_width = self.info.width;
        let target_height = self.info.height;

        let stream = self
            .input_context
            .stream(self.video_stream_index)
            .ok_or_else(|| ThumbnailError::VideoDecode("video stream disappeared".to_string()))?;
        let time_base = stream.time_base();
        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let mut decoder = decoder_context.decoder().video()?;

        // Container-level seek, so the position is in AV_TIME_BASE units.
        let position = seconds_to_seek_position(seconds);
        self.input_context.seek(position, ..position)?;

        let mut decoded = VideoFrame::empty();
        let mut nearest = NearestFrame::new(seconds);

        for (packet_stream, packet) in self.input_context.packets() {
            if cancel.is_cancelled() {
                return Err(ThumbnailError::Cancelled);
            }
            if packet_stream.index() != self.video_stream_index {
                continue;
            }

            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                let frame_seconds = decoded
                    .timestamp()
                    .or_else(|| decoded.pts())
                    .map(|pts| pts_to_seconds(pts, time_base));
                if nearest.offer(&mut decoded, frame_seconds) {
                    return nearest.into_image(target_width, target_height);
                }
            }
        }

        // End of stream: whatever came closest is the nearest accessible frame.
        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            let frame_seconds = decoded
                .timestamp()
                .or_else(|| decoded.pts())
                .map(|pts| pts_to_seconds(pts, time_base));
            if nearest.offer(&mut decoded, frame_seconds) {
                break;
            }
        }

        nearest.into_image(target_width, target_height)
    }
}

/// Keeps the best frame seen so far while decoding towards a target time.
struct NearestFrame {
    target: f64,
    best: Option<(VideoFrame, f64)>,
}

impl NearestFrame {
    fn new(target: f64) -> Self {
        Self { target, best: None }
    }

    /// Consider a freshly decoded frame. Returns `true` once decoding can
    /// stop because the target has been reached or passed.
    ///
    /// Frames are swapped out of `decoded` rather than copied.
    fn offer(&mut self, decoded: &mut VideoFrame, frame_seconds: Option<f64>) -> bool {
        let Some(frame_seconds) = frame_seconds else {
            // No timing information at all: take the first frame we get.
            self.best = Some((std::mem::replace(decoded, VideoFrame::empty()), self.target));
            return true;
        };

        let distance = (frame_seconds - self.target).abs();
        let closer = self
            .best
            .as_ref()
            .is_none_or(|(_, best_seconds)| distance < (best_seconds - self.target).abs());
        if closer {
            self.best = Some((std::mem::replace(decoded, VideoFrame::empty()), frame_seconds));
        }
        frame_seconds >= self.target
    }

    fn into_image(self, width: u32, height: u32) -> Result<RgbImage, ThumbnailError> {
        let (frame, _) = self.best.ok_or_else(|| {
            ThumbnailError::VideoDecode(format!("no frame decodable near {:.3}s", self.target))
        })?;
        convert_frame_to_image(&frame, width, height)
    }
}

/// Convert a decoded frame of any pixel format and size into an RGB image of
/// exactly `width × height`.
fn convert_frame_to_image(frame: &VideoFrame, width: u32, height: u32) -> Result<RgbImage, ThumbnailError> {
    let mut scaler = ScalingContext::get(
        frame.format(),
        frame.width(),
        frame.height(),
        Pixel::RGB24,
        width,
        height,
        ScalingFlags::BILINEAR,
    )?;
    let mut rgb_frame = VideoFrame::empty();
    scaler.run(frame, &mut rgb_frame)?;

    let buffer = frame_to_rgb_buffer(&rgb_frame, width, height).ok_or_else(|| {
        ThumbnailError::VideoDecode("converted frame is smaller than expected".to_string())
    })?;
    RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
        ThumbnailError::VideoDecode("failed to construct RGB image from decoded frame".to_string())
    })
}
