//! The thumbnail pipeline.
//!
//! [`Thumbnailer`] ties the stages together:
//!
//! ```text
//! probe ─► sample ─► score ─► select ─► compose ─► encode ─► deliver
//!   └──────── explicit timestamp ───────┘
//! ```
//!
//! With an explicit timestamp, sampling and scoring are skipped and one frame
//! is extracted. With a prompt, the model is obtained first so a missing
//! model fails the request before any decoding starts.
//!
//! Blocking stages run on the [`WorkerPool`]. The whole render is bounded by
//! the configured request timeout; when it elapses the request's
//! [`CancellationToken`](crate::CancellationToken) is tripped so the decoder
//! stops at the next packet, and [`ThumbnailError::Timeout`] is returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clip_thumbnailer::{
//!     DeliveryConfig, FfmpegBackend, ModelHandle, TargetGeometry, ThumbnailRequest,
//!     Thumbnailer, ThumbnailerConfig, VideoSource,
//! };
//!
//! # async fn example() -> Result<(), clip_thumbnailer::ThumbnailError> {
//! let thumbnailer = Thumbnailer::new(
//!     Arc::new(FfmpegBackend::new()),
//!     Arc::new(ModelHandle::disabled()),
//!     DeliveryConfig::new().build()?,
//!     ThumbnailerConfig::new(),
//! );
//! let request = ThumbnailRequest::at_timestamp(
//!     VideoSource::parse("input.mp4"),
//!     3.2,
//!     TargetGeometry::new(1280, 720)?,
//! )?;
//! let thumbnail = thumbnailer.generate(&request).await?;
//! println!("{}", thumbnail.reference);
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use image::RgbImage;
use serde::Serialize;

use crate::{
    compositor::{Compositor, TargetGeometry},
    config::ThumbnailerConfig,
    delivery::{Delivery, DeliveryKey},
    error::ThumbnailError,
    metadata::VideoInfo,
    model::ModelHandle,
    output::{OutputFormat, OutputImage},
    overlay::OverlaySpec,
    progress::{ProgressCallback, ProgressTracker, Stage},
    request::{FrameSelection, ThumbnailRequest},
    sampler::{SampleSpec, sample_with_progress},
    scorer::{Prompt, ScoreEntry, Selection, score_candidates, select_best},
    source::{MediaBackend, VideoSource},
    worker::WorkerPool,
};

/// An encoded thumbnail that has not been delivered yet.
#[derive(Debug, Clone)]
pub struct RenderedThumbnail {
    /// The encoded image, exactly the requested size.
    pub image: OutputImage,
    /// Timestamp of the frame it was made from, in seconds.
    pub timestamp: f64,
    /// Similarity score of that frame; `None` on the explicit path.
    pub score: Option<f32>,
    /// Scores of every candidate, in timestamp order. Empty on the explicit
    /// path.
    pub scores: Vec<ScoreEntry>,
    /// Probe result of the source.
    pub source_info: VideoInfo,
}

/// A delivered thumbnail.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedThumbnail {
    /// Where the image can be retrieved: a URL or a local path.
    #[serde(rename = "url")]
    pub reference: String,
    /// Storage key.
    pub key: String,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Timestamp of the source frame, in seconds.
    pub timestamp: f64,
    /// Similarity score of the source frame, for prompt-driven requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Produces thumbnails. One instance serves all requests concurrently.
pub struct Thumbnailer {
    backend: Arc<dyn MediaBackend>,
    model: Arc<ModelHandle>,
    delivery: Arc<dyn Delivery>,
    compositor: Arc<Compositor>,
    pool: WorkerPool,
    config: ThumbnailerConfig,
}

impl Debug for Thumbnailer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Thumbnailer")
            .field("model", &self.model)
            .field("delivery", &self.delivery.name())
            .field("compositor", &self.compositor)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Thumbnailer {
    /// Assemble a thumbnailer from its collaborators.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        model: Arc<ModelHandle>,
        delivery: Arc<dyn Delivery>,
        config: ThumbnailerConfig,
    ) -> Self {
        let mut compositor = Compositor::new().with_policy(config.resize_policy);
        if let Some(font) = &config.font {
            compositor = compositor.with_font(font.clone());
        }
        let pool = config.worker_threads.map_or_else(WorkerPool::per_core, WorkerPool::new);
        log::debug!("Thumbnailer ready with {} blocking workers", pool.size());

        Self {
            backend,
            model,
            delivery,
            compositor: Arc::new(compositor),
            pool,
            config,
        }
    }

    /// The shared model handle.
    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// The delivery backend.
    pub fn delivery(&self) -> &Arc<dyn Delivery> {
        &self.delivery
    }

    /// The configuration.
    pub fn config(&self) -> &ThumbnailerConfig {
        &self.config
    }

    /// Probe `source` on a worker thread.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::UnreadableMedia`] if the source cannot be opened.
    pub async fn probe(&self, source: &VideoSource) -> Result<VideoInfo, ThumbnailError> {
        let backend = Arc::clone(&self.backend);
        let source = source.clone();
        self.pool
            .run(move || crate::probe::probe(backend.as_ref(), &source))
            .await
    }

    /// Render and deliver a thumbnail.
    ///
    /// The delivery key is generated up front, so an invalid prefix is
    /// rejected before any decoding.
    ///
    /// # Errors
    ///
    /// Any error of [`render`](Self::render), or
    /// [`ThumbnailError::Delivery`] if storing fails.
    pub async fn generate(&self, request: &ThumbnailRequest) -> Result<GeneratedThumbnail, ThumbnailError> {
        let key = DeliveryKey::generate(request.key_prefix.as_deref(), OutputFormat::Jpeg)?;
        let rendered = self.render(request).await?;

        log::debug!("Delivering {key} via {}", self.delivery.name());
        let mut tracker = ProgressTracker::new(Arc::clone(&self.config.progress), Stage::Delivery, Some(1));
        let OutputImage {
            bytes, width, height, ..
        } = rendered.image;
        let reference = self.delivery.store(bytes, &key).await?;
        tracker.advance(Some(rendered.timestamp));

        log::info!(
            "Delivered {width}x{height} thumbnail of {} at {:.3}s to {reference}",
            request.source,
            rendered.timestamp
        );
        Ok(GeneratedThumbnail {
            reference,
            key: key.as_str().to_string(),
            width,
            height,
            timestamp: rendered.timestamp,
            score: rendered.score,
        })
    }

    /// Render a thumbnail without delivering it.
    ///
    /// # Errors
    ///
    /// - [`ThumbnailError::UnreadableMedia`] if the source cannot be opened.
    /// - [`ThumbnailError::VideoDecode`] if an explicit timestamp yields no
    ///   frame.
    /// - [`ThumbnailError::NoFramesExtracted`] if sampling finds nothing.
    /// - [`ThumbnailError::ScoringUnavailable`] if the model cannot be used;
    ///   the caller should retry with an explicit timestamp.
    /// - [`ThumbnailError::Timeout`] if the request runs out of time.
    pub async fn render(&self, request: &ThumbnailRequest) -> Result<RenderedThumbnail, ThumbnailError> {
        let budget = self.config.request_timeout;
        match tokio::time::timeout(budget, self.render_selected(request)).await {
            Ok(result) => result,
            Err(_) => {
                request.cancellation.cancel();
                log::warn!("Request for {} timed out after {budget:?}", request.source);
                Err(ThumbnailError::Timeout(budget))
            }
        }
    }

    async fn render_selected(&self, request: &ThumbnailRequest) -> Result<RenderedThumbnail, ThumbnailError> {
        match &request.selection {
            FrameSelection::ExplicitTimestamp(seconds) => self.render_at(request, *seconds).await,
            FrameSelection::PromptDriven { prompt, sample_count } => {
                let spec = match sample_count {
                    Some(count) => self.config.sample_spec.with_count(*count),
                    None => self.config.sample_spec,
                };
                self.render_prompted(request, prompt, spec).await
            }
        }
    }

    async fn render_at(&self, request: &ThumbnailRequest, seconds: f64) -> Result<RenderedThumbnail, ThumbnailError> {
        let backend = Arc::clone(&self.backend);
        let finisher = self.finisher(request);
        let source = request.source.clone();
        let cancel = request.cancellation.clone();

        self.pool
            .run(move || {
                let mut reader = backend.open(&source)?;
                let info = reader.info().clone();
                let timestamp = info.clamp_timestamp(seconds);
                if timestamp != seconds {
                    log::warn!(
                        "Timestamp {seconds:.3}s is past the end of {source} ({:.3}s); using {timestamp:.3}s",
                        info.duration_seconds
                    );
                }
                log::debug!("Extracting {source} at {timestamp:.3}s");
                let frame = reader.frame_at(timestamp, &cancel)?;
                drop(reader);

                let image = finisher.finish(&frame)?;
                Ok(RenderedThumbnail {
                    image,
                    timestamp,
                    score: None,
                    scores: Vec::new(),
                    source_info: info,
                })
            })
            .await
    }

    async fn render_prompted(
        &self,
        request: &ThumbnailRequest,
        prompt: &Prompt,
        spec: SampleSpec,
    ) -> Result<RenderedThumbnail, ThumbnailError> {
        let model = self.model.get().await?;

        let backend = Arc::clone(&self.backend);
        let source = request.source.clone();
        let cancel = request.cancellation.clone();
        let progress = Arc::clone(&self.config.progress);
        let (info, mut candidates) = self
            .pool
            .run(move || {
                let mut reader = backend.open(&source)?;
                let info = reader.info().clone();
                let candidates = sample_with_progress(&mut *reader, &spec, &cancel, progress)?;
                Ok((info, candidates))
            })
            .await?;
        if request.cancellation.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }

        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.config.progress),
            Stage::Scoring,
            Some(candidates.len() as u64),
        );
        score_candidates(model.as_ref(), prompt, &mut candidates).await?;
        for candidate in &candidates {
            tracker.advance(Some(candidate.timestamp));
        }

        let attempted = candidates.len();
        let Some(Selection { best, scores }) = select_best(candidates) else {
            if attempted == 0 {
                return Err(ThumbnailError::NoFramesExtracted { attempted });
            }
            return Err(ThumbnailError::ScoringUnavailable(format!(
                "{} produced no finite score for {attempted} candidates",
                model.name()
            )));
        };
        log::info!(
            "Selected frame at {:.3}s of {} (score {:.4}, {} candidates)",
            best.timestamp,
            request.source,
            best.score.unwrap_or(f32::NAN),
            scores.len()
        );

        let finisher = self.finisher(request);
        let (timestamp, score) = (best.timestamp, best.score);
        let frame = best.image;
        let image = self.pool.run(move || finisher.finish(&frame)).await?;
        Ok(RenderedThumbnail {
            image,
            timestamp,
            score,
            scores,
            source_info: info,
        })
    }

    fn finisher(&self, request: &ThumbnailRequest) -> Finisher {
        Finisher {
            compositor: Arc::clone(&self.compositor),
            geometry: request.geometry,
            overlay: request.overlay.clone(),
            quality: self.config.jpeg_quality,
            progress: Arc::clone(&self.config.progress),
        }
    }
}

/// The compose-and-encode tail shared by both paths, owned by the job that
/// runs it.
struct Finisher {
    compositor: Arc<Compositor>,
    geometry: TargetGeometry,
    overlay: Option<OverlaySpec>,
    quality: u8,
    progress: Arc<dyn ProgressCallback>,
}

impl Finisher {
    fn finish(&self, frame: &RgbImage) -> Result<OutputImage, ThumbnailError> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.progress), Stage::Compositing, Some(1));
        let canvas = self.compositor.compose(frame, self.geometry, self.overlay.as_ref());
        let image = OutputImage::encode_jpeg(&canvas, self.quality)?;
        tracker.advance(None);

        if (image.width, image.height) != (self.geometry.width(), self.geometry.height()) {
            return Err(ThumbnailError::Encoding(format!(
                "composed {}x{} instead of {}x{}",
                image.width,
                image.height,
                self.geometry.width(),
                self.geometry.height()
            )));
        }
        Ok(image)
    }
}
