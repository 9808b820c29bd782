//! In-memory stand-ins for the media backend, the similarity model and
//! delivery, so the pipeline can be exercised without FFmpeg or a network.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use clip_thumbnailer::{
    CancellationToken, Delivery, DeliveryKey, Embedding, FrameReader, MediaBackend, ModelLoader,
    SimilarityModel, ThumbnailError, VideoInfo, VideoSource,
};
use image::{Rgb, RgbImage};

/// Red channel value a synthetic frame carries for `seconds`.
pub fn red_for(seconds: f64) -> u8 {
    (seconds * 10.0).round().clamp(0.0, 255.0) as u8
}

/// A solid frame whose red channel encodes its timestamp.
pub fn frame_for(seconds: f64, width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([red_for(seconds), 64, 128]))
}

// ── Media backend ──────────────────────────────────────────────────

/// A synthetic video of fixed duration and size.
#[derive(Clone)]
pub struct FakeBackend {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Timestamps (in tenths of a second) whose extraction fails.
    pub failing: HashSet<u64>,
    /// Fail every extraction.
    pub fail_all: bool,
    /// Fail to open at all.
    pub unreadable: bool,
    /// Sleep this long per extraction, checking for cancellation.
    pub delay: Option<Duration>,
    pub opens: Arc<AtomicUsize>,
    pub extractions: Arc<Mutex<Vec<f64>>>,
    /// Local files that existed when opened, with their contents.
    pub opened_files: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
}

impl FakeBackend {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            width,
            height,
            failing: HashSet::new(),
            fail_all: false,
            unreadable: false,
            delay: None,
            opens: Arc::new(AtomicUsize::new(0)),
            extractions: Arc::new(Mutex::new(Vec::new())),
            opened_files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_at(mut self, seconds: f64) -> Self {
        self.failing.insert((seconds * 10.0).round() as u64);
        self
    }

    pub fn extracted(&self) -> Vec<f64> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn reader(&self) -> FakeReader {
        FakeReader {
            backend: self.clone(),
            info: VideoInfo::new(self.duration, self.width, self.height),
        }
    }
}

impl MediaBackend for FakeBackend {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, ThumbnailError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let VideoSource::Path(path) = source {
            if let Ok(bytes) = std::fs::read(path) {
                self.opened_files.lock().unwrap().push((path.clone(), bytes));
            }
        }
        if self.unreadable {
            return Err(ThumbnailError::UnreadableMedia {
                source_name: source.location(),
                reason: "synthetic failure".to_string(),
            });
        }
        Ok(Box::new(self.reader()))
    }
}

pub struct FakeReader {
    backend: FakeBackend,
    info: VideoInfo,
}

impl FrameReader for FakeReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, seconds: f64, cancel: &CancellationToken) -> Result<RgbImage, ThumbnailError> {
        self.backend.extractions.lock().unwrap().push(seconds);
        if let Some(delay) = self.backend.delay {
            let step = Duration::from_millis(5);
            let mut waited = Duration::ZERO;
            while waited < delay {
                if cancel.is_cancelled() {
                    return Err(ThumbnailError::Cancelled);
                }
                std::thread::sleep(step);
                waited += step;
            }
        }
        let tenths = (seconds * 10.0).round() as u64;
        if self.backend.fail_all || self.backend.failing.contains(&tenths) {
            return Err(ThumbnailError::VideoDecode(format!("synthetic miss at {seconds}")));
        }
        Ok(frame_for(seconds, self.info.width, self.info.height))
    }
}

// ── Similarity model ───────────────────────────────────────────────

/// Scores frames by how close their red channel is to `target_red`.
///
/// Texts embed to `[1, 0]`; a frame embeds to `[cos θ, sin θ]` with θ
/// growing with the distance from the target, so the closest frame has
/// the highest cosine similarity.
pub struct FakeModel {
    pub target_red: u8,
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    pub images_embedded: AtomicUsize,
    /// Return one embedding fewer than asked for.
    pub short_batches: bool,
    /// Embed every image to NaN.
    pub degenerate: bool,
}

impl FakeModel {
    pub fn new(target_red: u8) -> Self {
        Self {
            target_red,
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            images_embedded: AtomicUsize::new(0),
            short_batches: false,
            degenerate: false,
        }
    }

    /// A model that scores every frame identically.
    pub fn uniform() -> Self {
        Self::new(0).with_flat_scores()
    }

    fn with_flat_scores(mut self) -> Self {
        self.target_red = u8::MAX;
        self
    }
}

#[async_trait]
impl SimilarityModel for FakeModel {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, ThumbnailError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|_| Embedding(vec![1.0, 0.0])).collect())
    }

    async fn embed_images(&self, images: &[&RgbImage]) -> Result<Vec<Embedding>, ThumbnailError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.images_embedded.fetch_add(images.len(), Ordering::SeqCst);
        let mut embeddings: Vec<Embedding> = images
            .iter()
            .map(|image| {
                let red = image.get_pixel(0, 0).0[0];
                let distance = if self.target_red == u8::MAX {
                    0.0
                } else {
                    (red as f32 - self.target_red as f32).abs() / 255.0
                };
                let angle = distance * std::f32::consts::FRAC_PI_2;
                if self.degenerate {
                    Embedding(vec![f32::NAN, 0.0])
                } else {
                    Embedding(vec![angle.cos(), angle.sin()])
                }
            })
            .collect();
        if self.short_batches {
            embeddings.pop();
        }
        Ok(embeddings)
    }

    fn name(&self) -> &str {
        "fake-clip"
    }
}

/// Loader that counts loads and fails the first `failures` of them.
pub struct CountingLoader {
    pub loads: AtomicUsize,
    pub failures: usize,
    pub target_red: u8,
    pub delay: Duration,
}

impl CountingLoader {
    pub fn new(target_red: u8) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures: 0,
            target_red,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self) -> Result<Arc<dyn SimilarityModel>, ThumbnailError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if attempt < self.failures {
            return Err(ThumbnailError::Io(std::io::Error::other("weights missing")));
        }
        Ok(Arc::new(FakeModel::new(self.target_red)))
    }
}

// ── Delivery ───────────────────────────────────────────────────────

/// Keeps delivered images in memory.
#[derive(Default)]
pub struct MemoryDelivery {
    pub stored: Mutex<HashMap<String, Vec<u8>>>,
    pub fail: bool,
}

impl MemoryDelivery {
    pub fn failing() -> Self {
        Self {
            stored: Mutex::new(HashMap::new()),
            fail: true,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.stored.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    async fn store(&self, bytes: Vec<u8>, key: &DeliveryKey) -> Result<String, ThumbnailError> {
        if self.fail {
            return Err(ThumbnailError::Delivery("bucket unavailable".to_string()));
        }
        self.stored.lock().unwrap().insert(key.as_str().to_string(), bytes);
        Ok(format!("memory://{key}"))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
