//! Exact-size frame compositing.
//!
//! [`Compositor::compose`] turns a selected frame into an image of exactly
//! the requested [`TargetGeometry`]. The default [`ResizePolicy::Cover`]
//! scales the frame uniformly until it covers the target box and then
//! center-crops the overflow; [`ResizePolicy::Contain`] letterboxes instead
//! and is only used when asked for. The optional title overlay is drawn last,
//! on the final canvas, so it never affects geometry.
//!
//! # Example
//!
//! ```
//! use clip_thumbnailer::{Compositor, TargetGeometry};
//! use image::RgbImage;
//!
//! let frame = RgbImage::new(640, 480);
//! let target = TargetGeometry::new(1280, 720)?;
//! let output = Compositor::new().compose(&frame, target, None);
//! assert_eq!(output.dimensions(), (1280, 720));
//! # Ok::<(), clip_thumbnailer::ThumbnailError>(())
//! ```

use image::{Rgb, RgbImage, imageops, imageops::FilterType};
use serde::Serialize;

use crate::{
    error::ThumbnailError,
    overlay::{OverlaySpec, TitleFont, draw_title_bar},
};

/// Largest accepted output edge, in pixels.
pub const MAX_DIMENSION: u32 = 8192;

/// Default output width when the caller gives no geometry.
pub const DEFAULT_WIDTH: u32 = 1280;

/// Default output height when the caller gives no geometry.
pub const DEFAULT_HEIGHT: u32 = 720;

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TargetGeometry {
    width: u32,
    height: u32,
}

impl TargetGeometry {
    /// Validate and build a geometry.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if either edge is zero or larger
    /// than [`MAX_DIMENSION`].
    pub fn new(width: u32, height: u32) -> Result<Self, ThumbnailError> {
        if width == 0 || height == 0 {
            return Err(ThumbnailError::InvalidRequest(format!(
                "target dimensions must be positive, got {width}x{height}"
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ThumbnailError::InvalidRequest(format!(
                "target dimensions {width}x{height} exceed the {MAX_DIMENSION}px limit"
            )));
        }
        Ok(Self { width, height })
    }

    /// Resolve optional caller input: both edges, or neither (defaults).
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if only one edge is given, or the
    /// given edges fail [`TargetGeometry::new`].
    pub fn from_optional(width: Option<u32>, height: Option<u32>) -> Result<Self, ThumbnailError> {
        match (width, height) {
            (Some(width), Some(height)) => Self::new(width, height),
            (None, None) => Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            (Some(_), None) => Err(ThumbnailError::InvalidRequest(
                "width given without height".to_string(),
            )),
            (None, Some(_)) => Err(ThumbnailError::InvalidRequest(
                "height given without width".to_string(),
            )),
        }
    }

    /// Output width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for TargetGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// How a frame is fitted into the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePolicy {
    /// Fill the box, preserve aspect ratio, crop the overflow centrally.
    #[default]
    Cover,
    /// Fit inside the box, preserve aspect ratio, pad with `background`.
    Contain {
        /// Padding colour.
        background: Rgb<u8>,
    },
}

/// The scale-then-place arithmetic for one frame and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    /// Width of the uniformly scaled frame.
    pub scaled_width: u32,
    /// Height of the uniformly scaled frame.
    pub scaled_height: u32,
    /// Cover: left edge of the crop window in the scaled frame.
    /// Contain: left edge of the scaled frame on the canvas.
    pub offset_x: u32,
    /// Cover: top edge of the crop window in the scaled frame.
    /// Contain: top edge of the scaled frame on the canvas.
    pub offset_y: u32,
}

impl CropPlan {
    /// Cover plan: scale by `max(tw/sw, th/sh)`, then crop centrally.
    ///
    /// Scaled edges are rounded and never fall below the target, so the crop
    /// window always fits.
    pub fn cover(source_width: u32, source_height: u32, target: TargetGeometry) -> Self {
        let (source_width, source_height) = (source_width.max(1), source_height.max(1));
        let scale = f64::max(
            target.width as f64 / source_width as f64,
            target.height as f64 / source_height as f64,
        );
        let scaled_width = ((source_width as f64 * scale).round() as u32).max(target.width);
        let scaled_height = ((source_height as f64 * scale).round() as u32).max(target.height);
        Self {
            scaled_width,
            scaled_height,
            offset_x: (scaled_width - target.width) / 2,
            offset_y: (scaled_height - target.height) / 2,
        }
    }

    /// The cover crop window mapped back into source pixels, as
    /// `(x, y, width, height)`.
    ///
    /// Cropping this window from the source and resizing it to the target
    /// gives the cover result without materialising the scaled frame, whose
    /// size is unbounded for extreme aspect ratios.
    pub fn source_window(&self, source_width: u32, source_height: u32, target: TargetGeometry) -> (u32, u32, u32, u32) {
        let (source_width, source_height) = (source_width.max(1), source_height.max(1));
        let x_ratio = source_width as f64 / self.scaled_width as f64;
        let y_ratio = source_height as f64 / self.scaled_height as f64;

        let width = ((target.width as f64 * x_ratio).round() as u32).clamp(1, source_width);
        let height = ((target.height as f64 * y_ratio).round() as u32).clamp(1, source_height);
        let x = ((self.offset_x as f64 * x_ratio).round() as u32).min(source_width - width);
        let y = ((self.offset_y as f64 * y_ratio).round() as u32).min(source_height - height);
        (x, y, width, height)
    }

    /// Contain plan: scale by `min(tw/sw, th/sh)`, then center on the canvas.
    pub fn contain(source_width: u32, source_height: u32, target: TargetGeometry) -> Self {
        let (source_width, source_height) = (source_width.max(1), source_height.max(1));
        let scale = f64::min(
            target.width as f64 / source_width as f64,
            target.height as f64 / source_height as f64,
        );
        let scaled_width = ((source_width as f64 * scale).round() as u32).clamp(1, target.width);
        let scaled_height = ((source_height as f64 * scale).round() as u32).clamp(1, target.height);
        Self {
            scaled_width,
            scaled_height,
            offset_x: (target.width - scaled_width) / 2,
            offset_y: (target.height - scaled_height) / 2,
        }
    }
}

/// Produces exact-size output images from selected frames.
///
/// Holds only immutable configuration, so one instance serves every request.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    policy: ResizePolicy,
    font: Option<TitleFont>,
}

impl Compositor {
    /// Cover policy, no title font.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different resize policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ResizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `font` for overlay titles.
    #[must_use]
    pub fn with_font(mut self, font: TitleFont) -> Self {
        self.font = Some(font);
        self
    }

    /// The configured resize policy.
    pub fn policy(&self) -> ResizePolicy {
        self.policy
    }

    /// Compose `image` into an image of exactly `target`'s size, then draw
    /// `overlay` on top if given.
    ///
    /// Pure and deterministic; `image` is only read.
    pub fn compose(&self, image: &RgbImage, target: TargetGeometry, overlay: Option<&OverlaySpec>) -> RgbImage {
        log::debug!(
            "Compositing {}x{} frame into {}x{} ({:?})",
            image.width(),
            image.height(),
            target.width,
            target.height,
            self.policy
        );
        let mut canvas = match self.policy {
            ResizePolicy::Cover => cover(image, target),
            ResizePolicy::Contain { background } => contain(image, target, background),
        };
        if let Some(overlay) = overlay {
            draw_title_bar(&mut canvas, overlay, self.font.as_ref());
        }
        canvas
    }
}

fn cover(image: &RgbImage, target: TargetGeometry) -> RgbImage {
    let plan = CropPlan::cover(image.width(), image.height(), target);
    let (x, y, width, height) = plan.source_window(image.width(), image.height(), target);
    let window = imageops::crop_imm(image, x, y, width, height).to_image();
    scale_to(&window, target.width, target.height)
}

fn contain(image: &RgbImage, target: TargetGeometry, background: Rgb<u8>) -> RgbImage {
    let plan = CropPlan::contain(image.width(), image.height(), target);
    let scaled = scale_to(image, plan.scaled_width, plan.scaled_height);
    let mut canvas = RgbImage::from_pixel(target.width, target.height, background);
    imageops::replace(&mut canvas, &scaled, plan.offset_x as i64, plan.offset_y as i64);
    canvas
}

fn scale_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Lanczos3)
    }
}
