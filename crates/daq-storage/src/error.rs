//! Cache error type.

use daq_core::DaqError;
use thiserror::Error;

/// Errors raised by the record cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// A gated scan filled its capacity.
    ///
    /// **Error Type**: Actionable - the scan is longer than the configured
    /// capacity. The offending record is dropped and every record already
    /// stored for the scan is left untouched.
    ///
    /// **Recovery Strategy**: Increase the scan capacity or stop the scan.
    #[error("Scan overflow: capacity {capacity} reached at frame {sequence_id}")]
    ScanOverflow { capacity: usize, sequence_id: i64 },

    /// Per-bin access on a cache that is not in bin mode.
    #[error("Cache is in {mode} mode, not bins")]
    NotBinned { mode: &'static str },

    /// Bin index past the configured bin count.
    #[error("Bin {bin} out of range for {bins} bins")]
    BinOutOfRange { bin: usize, bins: usize },

    /// A record tap with this id is already registered.
    #[error("Record tap '{0}' already exists")]
    DuplicateTap(String),

    /// Invalid cache configuration.
    #[error(transparent)]
    Config(#[from] DaqError),
}
