//! Process-wide similarity model handle.
//!
//! Loading a CLIP-style model is expensive, so it happens at most once per
//! [`ModelHandle`], on first use. The handle is shared by all requests;
//! concurrent first callers wait on the same load instead of starting their
//! own. A failed load is not remembered, so a model that comes up later
//! (weights downloaded, embedding service restarted) is picked up by the next
//! request. Inference itself never takes a lock.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{error::ThumbnailError, scorer::SimilarityModel};

/// Knows how to construct a [`SimilarityModel`].
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model.
    ///
    /// Any error is reported to callers as
    /// [`ThumbnailError::ScoringUnavailable`].
    async fn load(&self) -> Result<Arc<dyn SimilarityModel>, ThumbnailError>;
}

/// Loader for deployments without a similarity model.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModel;

#[async_trait]
impl ModelLoader for NoModel {
    async fn load(&self) -> Result<Arc<dyn SimilarityModel>, ThumbnailError> {
        Err(ThumbnailError::ScoringUnavailable(
            "no similarity model is configured".to_string(),
        ))
    }
}

/// Lazily loaded, shared similarity model.
pub struct ModelHandle {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn SimilarityModel>>,
}

impl Debug for ModelHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ModelHandle")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    /// A handle that will load through `loader` on first use.
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    /// A handle around an already constructed model.
    pub fn preloaded(model: Arc<dyn SimilarityModel>) -> Self {
        Self {
            loader: Arc::new(NoModel),
            model: OnceCell::new_with(Some(model)),
        }
    }

    /// A handle that always reports scoring as unavailable.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoModel))
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the shared model, loading it if this is the first call.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::ScoringUnavailable`] if loading fails.
    pub async fn get(&self) -> Result<Arc<dyn SimilarityModel>, ThumbnailError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                log::info!("Loading similarity model");
                self.loader
                    .load()
                    .await
                    .map_err(ThumbnailError::into_scoring_unavailable)
            })
            .await?;
        Ok(Arc::clone(model))
    }
}
