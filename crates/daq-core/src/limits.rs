//! Shared hard limits to prevent unbounded allocations or payload growth.
//!
//! This module centralizes:
//! - Payload size limits (frames, declared uncompressed sizes)
//! - Default bounds for queues and bursts
//! - The window used for frame rate estimation
//!
//! Using centralized constants ensures consistency across the decoder, the
//! association engine and the cache.

use crate::error::DaqError;
use std::time::Duration;

// =============================================================================
// Timing
// =============================================================================

/// Duration window for frame rate calculation (1 second).
///
/// Frame arrival instants older than this are discarded when computing
/// the current frames-per-second rate.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

// =============================================================================
// Queue Limits
// =============================================================================

/// Default per-channel metadata queue capacity.
///
/// Metadata is drained to the freshest value on every frame, so a handful of
/// slots is enough to absorb bursts between two frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Default number of consecutive decode failures reported as a burst.
pub const DEFAULT_DECODE_BURST_THRESHOLD: u32 = 10;

/// Upper bound on records held by one cache ring.
///
/// Ring slots are allocated up front, so the configured capacity is bounded
/// before construction.
pub const MAX_CACHE_RECORDS: usize = 1_000_000;

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum allowed decoded frame size in bytes (default: 100MB).
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;
/// Maximum supported extent of a single frame dimension.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Number of elements.
    pub elements: usize,
    /// Size in bytes.
    pub bytes: usize,
}

/// Validate frame dimensions and calculate element/byte sizes safely.
///
/// An empty dimension list describes a zero-dimensional frame with one element.
pub fn validate_frame_size(dims: &[u32], element_size: usize) -> Result<FrameSize, DaqError> {
    let mut elements: usize = 1;
    for &extent in dims {
        if extent > MAX_FRAME_DIMENSION {
            return Err(DaqError::DimensionTooLarge {
                extent,
                max_dimension: MAX_FRAME_DIMENSION,
            });
        }
        elements = elements
            .checked_mul(extent as usize)
            .ok_or(DaqError::SizeOverflow {
                context: "frame element count",
            })?;
    }

    let bytes = elements
        .checked_mul(element_size)
        .ok_or(DaqError::SizeOverflow {
            context: "frame byte size",
        })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(DaqError::FrameTooLarge {
            bytes: bytes as u64,
            max_bytes: MAX_FRAME_BYTES,
        });
    }

    Ok(FrameSize { elements, bytes })
}

/// Validate a declared uncompressed size before allocating an output buffer.
pub fn validate_declared_size(uncompressed_size: u64) -> Result<usize, DaqError> {
    if uncompressed_size > MAX_FRAME_BYTES as u64 {
        return Err(DaqError::FrameTooLarge {
            bytes: uncompressed_size,
            max_bytes: MAX_FRAME_BYTES,
        });
    }
    usize::try_from(uncompressed_size).map_err(|_| DaqError::SizeOverflow {
        context: "declared uncompressed size",
    })
}
