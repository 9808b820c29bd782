//! Final image encoding.

use image::{ExtendedColorType, RgbImage, codecs::jpeg::JpegEncoder};
use serde::Serialize;

use crate::error::ThumbnailError;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encoded output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Baseline JPEG.
    #[default]
    Jpeg,
}

impl OutputFormat {
    /// MIME type of the encoded bytes.
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// An encoded thumbnail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Encoding format.
    pub format: OutputFormat,
}

impl OutputImage {
    /// Encode `image` as JPEG at `quality` (clamped to `1..=100`).
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Encoding`] if the buffer is malformed or the encoder
    /// fails.
    pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Self, ThumbnailError> {
        let (width, height) = image.dimensions();
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || image.as_raw().len() != expected {
            return Err(ThumbnailError::Encoding(format!(
                "malformed {width}x{height} buffer of {} bytes",
                image.as_raw().len()
            )));
        }

        let mut bytes = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|error| ThumbnailError::Encoding(error.to_string()))?;
        log::debug!("Encoded {width}x{height} JPEG ({} bytes)", bytes.len());

        Ok(Self {
            bytes,
            width,
            height,
            format: OutputFormat::Jpeg,
        })
    }

    /// MIME type of [`bytes`](Self::bytes).
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}
