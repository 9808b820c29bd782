//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes the pipeline stage by stage (the sampler
//! reports once per attempted candidate), and [`CancellationToken`] lets the
//! async side stop a blocking decode job, which is how the request timeout
//! reaches FFmpeg.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use clip_thumbnailer::{ProgressCallback, ProgressInfo, ThumbnailerConfig};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {}/{:?}", info.stage, info.current, info.total);
//!     }
//! }
//!
//! let config = ThumbnailerConfig::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The pipeline stage a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Stage {
    /// Extracting candidate frames.
    Sampling,
    /// Embedding and scoring candidates.
    Scoring,
    /// Resizing, cropping and drawing the overlay.
    Compositing,
    /// Handing bytes to the delivery backend.
    Delivery,
}

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current stage.
    pub stage: Stage,
    /// Items processed so far within the stage.
    pub current: u64,
    /// Items expected within the stage, if known.
    pub total: Option<u64>,
    /// Wall-clock time since the stage started.
    pub elapsed: Duration,
    /// Timestamp of the frame just handled, in seconds.
    pub timestamp: Option<f64>,
}

/// Receiver for progress updates.
///
/// Callbacks run on worker threads, hence `Send + Sync`. They observe but
/// cannot halt the pipeline; use [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called after each unit of work.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state. The decoder checks the token between packets, so a
/// cancelled job stops within one packet's worth of work.
///
/// # Example
///
/// ```
/// use clip_thumbnailer::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_view = token.clone();
/// token.cancel();
/// assert!(worker_view.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks timing for one stage and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    stage: Stage,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, stage: Stage, total: Option<u64>) -> Self {
        Self {
            callback,
            stage,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one completed item and report it.
    pub(crate) fn advance(&mut self, timestamp: Option<f64>) {
        self.current += 1;
        self.callback.on_progress(&ProgressInfo {
            stage: self.stage,
            current: self.current,
            total: self.total,
            elapsed: self.start_time.elapsed(),
            timestamp,
        });
    }
}
