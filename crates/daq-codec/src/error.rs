//! Codec error type.
//!
//! Every variant is non-fatal for the pipeline: a frame that fails to decode
//! is dropped and counted as missed.

use daq_core::{CodecKind, DaqError};
use thiserror::Error;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding or encoding a frame payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Decoded byte count disagrees with the declared size.
    ///
    /// Also raised when the declared size is not a whole number of elements;
    /// `expected` is then the largest whole-element size below `actual`.
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Compressed stream is corrupted, truncated or uses an unsupported feature.
    #[error("{codec} decode failed: {reason}")]
    DecodeFailure { codec: CodecKind, reason: String },

    /// Codec tag not recognised.
    #[error("Unsupported codec '{0}'")]
    UnsupportedCodec(String),

    /// Declared sizes exceed the frame limits or do not fit the element type.
    #[error(transparent)]
    Limit(#[from] DaqError),
}

impl CodecError {
    pub(crate) fn failure(codec: CodecKind, reason: impl Into<String>) -> Self {
        CodecError::DecodeFailure {
            codec,
            reason: reason.into(),
        }
    }
}
