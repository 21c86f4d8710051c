//! Shared error type for the core data model.
//!
//! This module defines `DaqError`, raised when frames, shapes or configuration
//! values fail validation. Per-frame conditions that the pipeline folds into
//! statistics (decode failures, association outcomes) have their own types in
//! the crates that produce them; `DaqError` covers the validation building
//! blocks those crates share.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantic configuration errors caught at construction
//!   time (zero capacity, duplicate channel names). Always fatal.
//! - **`UnknownElementType`** / **`UnknownCodec`**: an enum tag that does not map
//!   to a supported variant.
//! - **Size errors** (`DimensionTooLarge`, `SizeOverflow`, `FrameTooLarge`,
//!   `PayloadNotAligned`): declared sizes that cannot be honoured safely.
//! - **`ShapeMismatch`**: declared frame dimensions disagree with the decoded
//!   element count.

use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for core validation.
///
/// # Example
///
/// ```rust
/// use daq_core::error::DaqError;
///
/// fn validate_capacity(capacity: usize) -> Result<(), DaqError> {
///     if capacity == 0 {
///         return Err(DaqError::Configuration("cache capacity must be > 0".into()));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DaqError {
    /// Configuration validation failed.
    ///
    /// Occurs when configuration values parse correctly but fail semantic
    /// validation (zero capacity, negative tolerance, unknown gating channel).
    ///
    /// **Error Type**: Permanent - requires fixing the configuration values.
    ///
    /// **Recovery Strategy**: Abort engine construction, report the message.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Element type tag is not one of the supported numeric types.
    #[error("Unknown element type '{0}'")]
    UnknownElementType(String),

    /// Codec tag is not one of `none`, `bslz4`, `lz4`, `blosc`.
    #[error("Unknown codec '{0}'")]
    UnknownCodec(String),

    /// A single frame dimension exceeds the supported extent.
    #[error("Frame dimension {extent} exceeds maximum {max_dimension}")]
    DimensionTooLarge { extent: u32, max_dimension: u32 },

    /// Calculating a size overflowed usize.
    #[error("Size overflow while computing {context}")]
    SizeOverflow { context: &'static str },

    /// Frame payload exceeds maximum allowed size.
    ///
    /// **Error Type**: Permanent for this frame - the frame is dropped before
    /// any allocation takes place.
    #[error("Frame size {bytes} bytes exceeds maximum {max_bytes} bytes")]
    FrameTooLarge { bytes: u64, max_bytes: usize },

    /// Byte buffer length is not a whole number of elements.
    #[error("Buffer of {bytes} bytes is not a multiple of element size {element_size}")]
    PayloadNotAligned { bytes: usize, element_size: usize },

    /// Declared frame dimensions do not match the decoded element count.
    #[error("Shape {shape:?} does not describe {elements} elements")]
    ShapeMismatch { shape: Vec<usize>, elements: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Configuration("capacity must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: capacity must be > 0"
        );
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = DaqError::ShapeMismatch {
            shape: vec![4, 4],
            elements: 15,
        };
        assert!(err.to_string().contains("[4, 4]"));
        assert!(err.to_string().contains("15 elements"));
    }
}
