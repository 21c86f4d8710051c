//! `daq-storage`
//!
//! Bounded, memory-safe history of synchronized records.
//!
//! - [`CacheManager`]: ring, gated-scan and binned topologies over
//!   pre-allocated [`RecordRing`] slots
//! - [`SharedCache`]: the cache behind a mutex for exporters, firing
//!   scan-complete callbacks registered in a [`ScanCompleteRegistry`]
//! - [`RecordTapRegistry`]: every-Nth-record live preview channels
//! - [`CacheSnapshot`] / [`ExportLayout`]: point-in-time copies with the
//!   shape contract an external writer needs

pub mod cache;
pub mod callbacks;
pub mod error;
pub mod export;
pub mod slots;
pub mod taps;

pub use cache::{
    bin_index, gate_open, Admission, CacheManager, CacheMode, Insertion, ScanPhase, SharedCache,
};
pub use callbacks::{CallbackHandle, ScanCompleteRegistry};
pub use error::CacheError;
pub use export::{CacheSnapshot, ExportLayout};
pub use slots::RecordRing;
pub use taps::{RecordTapRegistry, TapConsumer, DEFAULT_TAP_CHANNEL_SIZE};
