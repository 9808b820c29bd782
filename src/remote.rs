//! HTTP client for a CLIP embedding service.
//!
//! The model weights live in a separate inference service; this module speaks
//! its small JSON protocol:
//!
//! | Request | Body | Response |
//! |---------|------|----------|
//! | `GET {endpoint}/info` | – | `{"model": "...", "dimensions": 512}` |
//! | `POST {endpoint}/embed/text` | `{"model", "texts": [...]}` | `{"embeddings": [[...]]}` |
//! | `POST {endpoint}/embed/image` | `{"model", "images": [base64 JPEG]}` | `{"embeddings": [[...]]}` |
//!
//! Frames are downscaled before upload since CLIP preprocessing works at a
//! few hundred pixels anyway.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{RgbImage, codecs::jpeg::JpegEncoder, imageops};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    error::ThumbnailError,
    model::ModelLoader,
    scorer::{Embedding, SimilarityModel},
};

/// Longest edge of frames sent for embedding.
const UPLOAD_MAX_DIMENSION: u32 = 336;

/// JPEG quality of frames sent for embedding.
const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Connection settings for [`RemoteClipModel`].
#[derive(Debug, Clone)]
#[must_use]
pub struct RemoteModelConfig {
    /// Base URL of the embedding service, without trailing slash.
    pub endpoint: String,
    /// Model identifier requested from the service.
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum number of images per `embed/image` call.
    pub max_batch: usize,
}

impl RemoteModelConfig {
    /// Settings for `endpoint` with the default model and limits.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: "openai/clip-vit-base-patch32".to_string(),
            timeout: Duration::from_secs(30),
            max_batch: 32,
        }
    }

    /// Request a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the image batch size. Clamped to a minimum of 1.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    model: String,
    #[serde(default)]
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embeddings: Vec<Vec<f32>>,
}

/// A [`SimilarityModel`] backed by a remote embedding service.
#[derive(Debug, Clone)]
pub struct RemoteClipModel {
    client: Client,
    config: RemoteModelConfig,
    dimensions: Option<usize>,
}

impl RemoteClipModel {
    /// Connect and verify the service is serving the configured model.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::ScoringUnavailable`] if the service is unreachable,
    /// answers with an error, or serves a different model.
    pub async fn connect(config: RemoteModelConfig) -> Result<Self, ThumbnailError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout)
            .build()
            .map_err(unavailable)?;

        let url = format!("{}/info", config.endpoint);
        let response = client.get(&url).send().await.map_err(unavailable)?;
        let info: InfoResponse = check_status(response).await?.json().await.map_err(unavailable)?;
        if info.model != config.model {
            return Err(ThumbnailError::ScoringUnavailable(format!(
                "embedding service serves {}, expected {}",
                info.model, config.model
            )));
        }
        log::info!(
            "Connected to embedding service {} ({}, {} dimensions)",
            config.endpoint,
            info.model,
            info.dimensions.map_or_else(|| "?".to_string(), |d| d.to_string())
        );

        Ok(Self {
            client,
            config,
            dimensions: info.dimensions,
        })
    }

    async fn post_embeddings<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        expected: usize,
    ) -> Result<Vec<Embedding>, ThumbnailError> {
        let url = format!("{}/{path}", self.config.endpoint);
        let response = self.client.post(&url).json(body).send().await.map_err(unavailable)?;
        let parsed: EmbeddingsResponse =
            check_status(response).await?.json().await.map_err(unavailable)?;

        if parsed.embeddings.len() != expected {
            return Err(ThumbnailError::ScoringUnavailable(format!(
                "{path} returned {} embeddings for {expected} inputs",
                parsed.embeddings.len()
            )));
        }
        if let Some(dimensions) = self.dimensions {
            if let Some(bad) = parsed.embeddings.iter().find(|e| e.len() != dimensions) {
                return Err(ThumbnailError::ScoringUnavailable(format!(
                    "{path} returned a {}-dimensional embedding, expected {dimensions}",
                    bad.len()
                )));
            }
        }
        Ok(parsed.embeddings.into_iter().map(Embedding).collect())
    }
}

#[async_trait]
impl SimilarityModel for RemoteClipModel {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, ThumbnailError> {
        let body = TextRequest {
            model: &self.config.model,
            texts,
        };
        self.post_embeddings("embed/text", &body, texts.len()).await
    }

    async fn embed_images(&self, images: &[&RgbImage]) -> Result<Vec<Embedding>, ThumbnailError> {
        let mut embeddings = Vec::with_capacity(images.len());
        for batch in images.chunks(self.config.max_batch) {
            // Resizing and encoding are CPU work; keep them off the executor.
            let frames: Vec<RgbImage> = batch.iter().map(|image| (*image).clone()).collect();
            let encoded = tokio::task::spawn_blocking(move || {
                frames.iter().map(encode_for_upload).collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(|error| ThumbnailError::ScoringUnavailable(format!("frame upload encoding: {error}")))??;
            let body = ImageRequest {
                model: &self.config.model,
                images: encoded,
            };
            embeddings.extend(self.post_embeddings("embed/image", &body, batch.len()).await?);
        }
        Ok(embeddings)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// [`ModelLoader`] that connects a [`RemoteClipModel`].
#[derive(Debug, Clone)]
pub struct RemoteModelLoader {
    config: RemoteModelConfig,
}

impl RemoteModelLoader {
    /// Loader for the given service.
    pub fn new(config: RemoteModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    async fn load(&self) -> Result<Arc<dyn SimilarityModel>, ThumbnailError> {
        let model = RemoteClipModel::connect(self.config.clone()).await?;
        Ok(Arc::new(model))
    }
}

fn unavailable(error: reqwest::Error) -> ThumbnailError {
    ThumbnailError::ScoringUnavailable(error.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ThumbnailError> {
    match response.status() {
        StatusCode::OK => Ok(response),
        status => {
            let text = response.text().await.unwrap_or_default();
            Err(ThumbnailError::ScoringUnavailable(format!(
                "embedding service answered {status}: {text}"
            )))
        }
    }
}

/// Downscale and JPEG-encode a frame, returning base64 text.
fn encode_for_upload(image: &RgbImage) -> Result<String, ThumbnailError> {
    let (width, height) = image.dimensions();
    let scale = (UPLOAD_MAX_DIMENSION as f64 / width.max(height).max(1) as f64).min(1.0);
    let scaled_width = ((width as f64 * scale).round() as u32).max(1);
    let scaled_height = ((height as f64 * scale).round() as u32).max(1);
    let small = imageops::thumbnail(image, scaled_width, scaled_height);

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, UPLOAD_JPEG_QUALITY)
        .encode_image(&small)
        .map_err(|error| ThumbnailError::ScoringUnavailable(format!("frame upload encoding: {error}")))?;
    Ok(STANDARD.encode(bytes))
}
