//! Pipeline-level error type.
//!
//! Only conditions an operator must act on are errors here. Everything else a
//! bad frame can cause (decode failures, gaps, degraded association) is folded
//! into [`crate::stats::PipelineStats`] and the pipeline keeps running.
//!
//! ## Error Hierarchy
//!
//! - **`ScanOverflow`**: a gated scan outgrew the cache. Actionable.
//! - **`DecodeFailureBurst`**: the decoder failed on many consecutive frames,
//!   which points at a codec or transport misconfiguration. Actionable.
//! - **`Configuration`**: construction-time failure. Fatal.

use daq_codec::CodecError;
use daq_core::DaqError;
use daq_storage::CacheError;
use thiserror::Error;

/// Result alias for pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Actionable pipeline errors and construction failures.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A gated scan filled the cache; the frame was dropped.
    ///
    /// **Recovery Strategy**: stop the scan or raise the scan capacity. The
    /// records already cached for the scan are intact.
    #[error("Scan overflow: capacity {capacity} reached at frame {sequence_id}")]
    ScanOverflow { capacity: usize, sequence_id: i64 },

    /// `consecutive` frames in a row failed to decode.
    ///
    /// Reported once when the threshold is reached; the counter re-arms after
    /// the next successful decode.
    #[error("{consecutive} consecutive decode failures, last at frame {sequence_id}: {last_error}")]
    DecodeFailureBurst {
        consecutive: u32,
        sequence_id: i64,
        last_error: CodecError,
    },

    /// Cache misuse other than a scan overflow.
    #[error("Cache error: {0}")]
    Cache(CacheError),

    /// Configuration failed validation.
    #[error(transparent)]
    Configuration(#[from] DaqError),

    /// The runner task panicked or was cancelled.
    #[error("Stream runner terminated abnormally: {0}")]
    RunnerTerminated(String),
}

impl From<CacheError> for SyncError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::ScanOverflow {
                capacity,
                sequence_id,
            } => SyncError::ScanOverflow {
                capacity,
                sequence_id,
            },
            CacheError::Config(err) => SyncError::Configuration(err),
            other => SyncError::Cache(other),
        }
    }
}
