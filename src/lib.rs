//! # clip_thumbnailer
//!
//! Turn a video into one exact-size thumbnail, choosing the frame either at
//! an explicit timestamp or by asking a CLIP-style model which sampled frame
//! best matches a text prompt.
//!
//! Decoding is done by FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next); compositing and
//! JPEG encoding by [`image`] and [`imageproc`].
//!
//! ## Quick Start
//!
//! ### Plan the candidate frames
//!
//! ```
//! use clip_thumbnailer::{SampleSpec, sample_timestamps};
//!
//! let timestamps = sample_timestamps(60.0, &SampleSpec::default());
//! assert_eq!(timestamps.len(), 12);
//! ```
//!
//! ### Pick the best frame for a prompt
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clip_thumbnailer::{
//!     DeliveryConfig, FfmpegBackend, ModelHandle, Prompt, RemoteModelConfig,
//!     RemoteModelLoader, TargetGeometry, ThumbnailRequest, Thumbnailer, ThumbnailerConfig,
//!     VideoSource,
//! };
//!
//! # async fn example() -> Result<(), clip_thumbnailer::ThumbnailError> {
//! let loader = RemoteModelLoader::new(RemoteModelConfig::new("http://127.0.0.1:8500"));
//! let thumbnailer = Thumbnailer::new(
//!     Arc::new(FfmpegBackend::new()),
//!     Arc::new(ModelHandle::new(Arc::new(loader))),
//!     DeliveryConfig::new().build()?,
//!     ThumbnailerConfig::new(),
//! );
//!
//! let prompt = Prompt::new("a goal being scored").expect("non-blank prompt");
//! let request = ThumbnailRequest::from_prompt(
//!     VideoSource::parse("match.mp4"),
//!     prompt,
//!     TargetGeometry::new(1280, 720)?,
//! );
//! let thumbnail = thumbnailer.generate(&request).await?;
//! println!("{} (frame at {:.2}s)", thumbnail.reference, thumbnail.timestamp);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Deterministic sampling**: evenly spaced candidates with configurable
//!   leading and trailing margins
//! - **Prompt scoring**: batched image embedding, multi-phrase prompts,
//!   earliest-timestamp tie-break
//! - **Exact geometry**: cover scaling with center crop (contain/pad on
//!   request)
//! - **Title overlays**: semi-transparent bottom bar with clipped, centered
//!   text
//! - **Delivery**: local directory or Bunny Storage
//! - **Timeouts and cancellation**: a request timeout stops decoding
//!   mid-stream
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `server` | axum HTTP service (`/generate`, `/upload-generate`, `/static`, `/health`) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed. Prompt scoring needs a
//! reachable embedding service (see [`remote`]).

pub mod compositor;
pub mod config;
pub mod decoder;
pub mod delivery;
pub mod error;
pub mod ffmpeg;
pub mod metadata;
pub mod model;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod remote;
pub mod request;
pub mod sampler;
pub mod scorer;
#[cfg(feature = "server")]
pub mod server;
pub mod source;
mod utilities;
pub mod worker;

pub use compositor::{Compositor, CropPlan, ResizePolicy, TargetGeometry};
pub use config::ThumbnailerConfig;
pub use decoder::{FfmpegBackend, FfmpegReader};
pub use delivery::{
    BackendKind, BunnyConfig, BunnyDelivery, Delivery, DeliveryConfig, DeliveryKey, LocalDelivery, S3Config,
    S3Delivery,
};
pub use error::{ErrorKind, ThumbnailError};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use metadata::VideoInfo;
pub use model::{ModelHandle, ModelLoader, NoModel};
pub use output::{OutputFormat, OutputImage};
pub use overlay::{OverlaySpec, TitleFont};
pub use pipeline::{GeneratedThumbnail, RenderedThumbnail, Thumbnailer};
pub use probe::probe;
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo, Stage};
pub use remote::{RemoteClipModel, RemoteModelConfig, RemoteModelLoader};
pub use request::{FrameSelection, GenerateRequest, ThumbnailRequest};
pub use sampler::{
    Candidate, DEFAULT_SAMPLE_COUNT, MAX_SAMPLE_COUNT, Margin, SampleSpec, sample,
    sample_timestamps, sample_with_progress,
};
pub use scorer::{
    Embedding, Prompt, ScoreEntry, Selection, SimilarityModel, normalize_similarity,
    score_candidates, select_best,
};
#[cfg(feature = "server")]
pub use server::{ServerState, router, serve};
pub use source::{FrameReader, MediaBackend, VideoSource};
pub use worker::WorkerPool;
