//! FFmpeg library setup and log level control.
//!
//! FFmpeg writes its own diagnostics to stderr independently of the Rust
//! [`log`](https://crates.io/crates/log) facade. A thumbnail service decodes
//! arbitrary user uploads, which makes FFmpeg chatty; [`set_ffmpeg_log_level`]
//! lets the binary quiet it down without touching `ffmpeg-next` directly.
//!
//! # Example
//!
//! ```no_run
//! use clip_thumbnailer::FfmpegLogLevel;
//!
//! clip_thumbnailer::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::{str::FromStr, sync::OnceLock};

use ffmpeg_next::util::log::Level;

use crate::error::ThumbnailError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// No output at all.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = ThumbnailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "fatal" | "panic" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "debug" | "verbose" | "trace" => Ok(FfmpegLogLevel::Debug),
            other => Err(ThumbnailError::Configuration(format!(
                "unknown FFmpeg log level: {other}"
            ))),
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise the FFmpeg libraries exactly once per process.
///
/// The outcome of the first call is remembered; later calls return it
/// without touching FFmpeg again.
pub(crate) fn ensure_initialized() -> Result<(), ThumbnailError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| ffmpeg_next::init().map_err(|error| error.to_string()))
        .clone()
        .map_err(|reason| {
            ThumbnailError::Configuration(format!("FFmpeg initialisation failed: {reason}"))
        })
}
