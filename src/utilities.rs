//! Internal utility functions.
//!
//! Pixel-plane copying and timestamp conversions shared by the FFmpeg
//! decoder.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Microseconds per second, FFmpeg's `AV_TIME_BASE`.
pub(crate) const MICROSECONDS_PER_SECOND: f64 = 1_000_000.0;

/// Copy pixel data from an RGB24 FFmpeg frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// The padding is stripped so the result fits [`image::RgbImage::from_raw`].
/// Returns `None` if the plane is shorter than `width × height` pixels.
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Option<Vec<u8>> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let rows = height as usize;
    let data = video_frame.data(0);

    if stride == row_bytes {
        return data.get(..row_bytes * rows).map(<[u8]>::to_vec);
    }

    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let row_start = row * stride;
        buffer.extend_from_slice(data.get(row_start..row_start + row_bytes)?);
    }
    Some(buffer)
}

/// Convert seconds to an `AV_TIME_BASE` timestamp for container-level seeks.
pub(crate) fn seconds_to_seek_position(seconds: f64) -> i64 {
    (seconds.max(0.0) * MICROSECONDS_PER_SECOND) as i64
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Frame rate as a float, `0.0` when the rational is degenerate.
pub(crate) fn rational_to_f64(rate: Rational) -> f64 {
    if rate.denominator() == 0 {
        0.0
    } else {
        rate.numerator() as f64 / rate.denominator() as f64
    }
}
