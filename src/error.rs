// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the playback controller and its collaborators.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The source file could not be opened for reading.
    #[error("cannot open {path:?} for reading: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Decoding or reading frames from the source failed.
    #[error("read failed at frame {from_frame}: {reason}")]
    Read { from_frame: u32, reason: String },

    /// Start/end ordering or bounds violated. Nothing was changed.
    #[error("invalid window {requested_start:.6}s..{requested_end:.6}s (bound {bound:.6}s): {reason}")]
    InvalidWindow {
        requested_start: f64,
        requested_end: f64,
        bound: f64,
        reason: &'static str,
    },

    /// Start attempted with no loaded data.
    #[error("cannot play an empty buffer")]
    EmptyBuffer,

    /// A play-from request resolved to a zero-length window.
    #[error("segment {start:.6}s..{end:.6}s is empty or too short")]
    EmptyOrTooShortSegment { start: f64, end: f64 },

    /// Sample storage could not be obtained.
    #[error("cannot allocate {frames} frames x {channels} channels")]
    AllocationFailure { frames: u32, channels: u16 },

    /// A control operation was issued before a render sink was attached.
    #[error("player is not attached to a render sink yet")]
    NotReady,

    /// The render sink refused a request.
    #[error("render sink error: {0}")]
    Sink(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl PlayerError {
    /// Validation failures leave state untouched and are always recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PlayerError::AllocationFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
