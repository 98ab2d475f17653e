//! Error types for tuneme-core
//!
//! Caller-input validation errors are surfaced immediately and never retried.
//! `AudioSource` is fatal for the running session: the tuner stops and must be
//! started again explicitly.

use thiserror::Error;

/// Main error type for the tuning engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TunerError {
    /// Frame length differs from the configured block size
    #[error("Invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    /// Frequency was zero, negative or not finite
    #[error("Invalid frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// A tuning profile must hold exactly one note per string
    #[error("Invalid profile length: expected 6 notes, got {0}")]
    InvalidProfileLength(usize),

    /// String index outside 0..=5
    #[error("String index out of range: {0}")]
    IndexOutOfRange(i32),

    /// `start` called on a running tuner
    #[error("Audio stream already active")]
    StreamAlreadyActive,

    /// The audio source failed (device lost, stream error, ...)
    #[error("Audio source error: {0}")]
    AudioSource(String),

    /// Note name could not be parsed (expected e.g. "E2" or "C#3")
    #[error("Invalid note name: {0:?}")]
    InvalidNoteName(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience Result type using [`TunerError`]
pub type Result<T> = std::result::Result<T, TunerError>;
