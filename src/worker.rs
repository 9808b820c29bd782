//! Bounded pool for blocking work.
//!
//! Decoding, compositing and encoding are CPU-heavy and call into FFmpeg
//! synchronously, so they run on Tokio's blocking threads via
//! `spawn_blocking`. A semaphore caps how many such jobs run at once, sized
//! to the CPU count by default, so a burst of requests queues instead of
//! oversubscribing the machine. Request handlers and model inference stay on
//! the async side and are never held up by the permit.

use std::{num::NonZeroUsize, sync::Arc, thread};

use tokio::sync::Semaphore;

use crate::error::ThumbnailError;

/// Gate for blocking jobs.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool running at most `size` jobs at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// A pool sized to the available CPU cores.
    pub fn per_core() -> Self {
        Self::new(thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Maximum number of concurrent jobs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs that could start right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a slot is free.
    ///
    /// # Errors
    ///
    /// Whatever `job` returns, or [`ThumbnailError::Worker`] if the job
    /// panicked or the pool was shut down.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ThumbnailError>
    where
        F: FnOnce() -> Result<T, ThumbnailError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|error| ThumbnailError::Worker(error.to_string()))?;

        // The permit moves into the job so the slot stays taken until the
        // blocking thread finishes, even if the caller stops waiting.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::per_core()
    }
}
