//! Title bar overlay.
//!
//! A semi-transparent bar spanning the full width is blended onto the bottom
//! of the final canvas and the title is drawn centered inside it. Titles that
//! are too wide are clipped to the bar, never wrapped, and the canvas size is
//! never touched.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::Path,
    sync::Arc,
};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::error::ThumbnailError;

/// Font files tried by [`TitleFont::system_default`], in order.
pub const SYSTEM_FONT_PATHS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
];

/// Smallest automatic font size, in pixels.
const MIN_FONT_SIZE: f32 = 34.0;

/// Horizontal padding on each side of the title, as a fraction of width.
const HORIZONTAL_PADDING: f64 = 0.04;

/// Vertical padding above and below the title, as a fraction of the bar.
const VERTICAL_PADDING: f64 = 0.1;

/// Optional title overlay.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct OverlaySpec {
    /// Text to render. Blank titles draw nothing.
    pub title: String,
    /// Bar height as a fraction of the output height, in `(0, 1]`.
    pub bar_height_fraction: f64,
    /// Title colour.
    pub text_color: Rgb<u8>,
    /// Bar colour.
    pub background: Rgb<u8>,
    /// Bar opacity, 0 (invisible) to 255 (opaque).
    pub background_opacity: u8,
    /// Fixed font size in pixels; `None` scales with the output width.
    pub font_size: Option<f32>,
}

impl OverlaySpec {
    /// White text on a black bar at alpha 180 covering the bottom 18 %.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bar_height_fraction: 0.18,
            text_color: Rgb([255, 255, 255]),
            background: Rgb([0, 0, 0]),
            background_opacity: 180,
            font_size: None,
        }
    }

    /// Set the bar height fraction, clamped to `[0.02, 1.0]`.
    pub fn with_bar_height_fraction(mut self, fraction: f64) -> Self {
        self.bar_height_fraction = if fraction.is_finite() {
            fraction.clamp(0.02, 1.0)
        } else {
            0.18
        };
        self
    }

    /// Set the text colour.
    pub fn with_text_color(mut self, color: Rgb<u8>) -> Self {
        self.text_color = color;
        self
    }

    /// Set the bar colour and opacity.
    pub fn with_background(mut self, color: Rgb<u8>, opacity: u8) -> Self {
        self.background = color;
        self.background_opacity = opacity;
        self
    }

    /// Use a fixed font size.
    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = (size.is_finite() && size > 0.0).then_some(size);
        self
    }

    /// Bar height in pixels for a canvas `height` pixels tall; at least 1.
    pub fn bar_height(&self, height: u32) -> u32 {
        ((height as f64 * self.bar_height_fraction).round() as u32).clamp(1, height.max(1))
    }
}

/// A parsed TrueType/OpenType font shared between requests.
#[derive(Clone)]
pub struct TitleFont {
    font: Arc<FontVec>,
}

impl Debug for TitleFont {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TitleFont").finish_non_exhaustive()
    }
}

impl TitleFont {
    /// Parse font data.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Configuration`] if the data is not a usable font.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ThumbnailError> {
        let font = FontVec::try_from_vec(data)
            .map_err(|error| ThumbnailError::Configuration(format!("invalid font data: {error}")))?;
        Ok(Self { font: Arc::new(font) })
    }

    /// Read and parse a font file.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Io`] if the file cannot be read,
    /// [`ThumbnailError::Configuration`] if it is not a usable font.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ThumbnailError> {
        let path = path.as_ref();
        log::debug!("Loading title font from {}", path.display());
        Self::from_bytes(std::fs::read(path)?)
    }

    /// The first loadable font among [`SYSTEM_FONT_PATHS`].
    pub fn system_default() -> Option<Self> {
        SYSTEM_FONT_PATHS
            .iter()
            .find_map(|path| Self::from_file(path).ok())
    }
}

/// Blend the title bar onto `canvas` and draw the title into it.
///
/// Without a font only the bar is drawn.
pub(crate) fn draw_title_bar(canvas: &mut RgbImage, spec: &OverlaySpec, font: Option<&TitleFont>) {
    let title = spec.title.trim();
    if title.is_empty() {
        return;
    }
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let bar_height = spec.bar_height(height);
    let bar_top = height - bar_height;
    blend_bar(canvas, bar_top, spec.background, spec.background_opacity);

    let Some(font) = font else {
        log::warn!("No title font available; drawing the overlay bar without text");
        return;
    };

    let padding_x = (width as f64 * HORIZONTAL_PADDING).round() as u32;
    let padding_y = (bar_height as f64 * VERTICAL_PADDING).round() as u32;
    let max_text_width = width.saturating_sub(2 * padding_x).max(1);
    let max_text_height = bar_height.saturating_sub(2 * padding_y).max(1);

    let requested = spec
        .font_size
        .unwrap_or_else(|| MIN_FONT_SIZE.max(width as f32 / 24.0));
    let size = requested.min(max_text_height as f32).max(1.0);
    let scale = PxScale::from(size);

    let text = clip_to_width(title, scale, &font.font, max_text_width);
    if text.is_empty() {
        return;
    }
    let (text_width, text_height) = text_size(scale, &*font.font, text);
    let x = (width.saturating_sub(text_width) / 2) as i32;
    let y = (bar_top + bar_height.saturating_sub(text_height) / 2) as i32;

    // Dark outline keeps light text legible on bright frames.
    let stroke = ((size / 14.0) as i32).max(1);
    let outline = Rgb([0, 0, 0]);
    for dx in -stroke..=stroke {
        for dy in -stroke..=stroke {
            if dx != 0 || dy != 0 {
                draw_text_mut(canvas, outline, x + dx, y + dy, scale, &*font.font, text);
            }
        }
    }
    draw_text_mut(canvas, spec.text_color, x, y, scale, &*font.font, text);
}

fn blend_bar(canvas: &mut RgbImage, top: u32, color: Rgb<u8>, opacity: u8) {
    let alpha = opacity as u32;
    let inverse = 255 - alpha;
    for y in top..canvas.height() {
        for x in 0..canvas.width() {
            let pixel = canvas.get_pixel_mut(x, y);
            for channel in 0..3 {
                let blended = color.0[channel] as u32 * alpha + pixel.0[channel] as u32 * inverse;
                pixel.0[channel] = ((blended + 127) / 255) as u8;
            }
        }
    }
}

/// The longest character prefix of `text` that renders within `max_width`.
fn clip_to_width<'a>(text: &'a str, scale: PxScale, font: &FontVec, max_width: u32) -> &'a str {
    if text_size(scale, font, text).0 <= max_width {
        return text;
    }
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(index, _)| index)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();

    // Rendered width grows with each added character, so binary search works.
    let (mut low, mut high) = (0usize, boundaries.len());
    while low < high {
        let mid = (low + high) / 2;
        if text_size(scale, font, &text[..boundaries[mid]]).0 <= max_width {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    match low {
        0 => "",
        count => text[..boundaries[count - 1]].trim_end(),
    }
}

