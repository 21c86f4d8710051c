//! `daq-sync`
//!
//! Synchronizes detector frames with asynchronously published metadata.
//!
//! For each frame the [`SyncPipeline`] decodes the payload, checks the
//! sequence id for gaps, pairs every configured metadata channel with the
//! frame timestamp and hands the resulting [`SyncRecord`] to the bounded
//! cache. [`runner::spawn`] runs a pipeline on a tokio task.
//!
//! ```no_run
//! use daq_sync::{runner, SyncConfig, SyncPipeline};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = SyncConfig::load(None)?;
//! daq_sync::telemetry::init_tracing(&config.log_level).ok();
//! let pipeline = SyncPipeline::new(&config)?;
//! let stream = runner::spawn(pipeline, config.frame_channel_capacity);
//! stream.handle.stop();
//! let stats = stream.handle.join().await?;
//! println!("{}", stats.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod association;
pub mod config;
pub mod error;
pub mod gap;
pub mod pipeline;
pub mod runner;
pub mod stats;
pub mod telemetry;

pub use association::{
    classify, AssociationEngine, ChannelPolicy, FrameAssociation, InboxCounters, MetadataInbox,
};
pub use config::{ChannelConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use gap::SequenceGapDetector;
pub use pipeline::{DropReason, FrameState, PipelineOutput, SyncPipeline};
pub use runner::{FrameSender, MetadataPublisher, RunnerHandle, StreamRunner};
pub use stats::{ChannelCounts, ChannelSnapshot, PipelineStats, StatsSnapshot};

pub use daq_core::{MetadataUpdate, MetadataValue, SyncRecord, Timestamp};
pub use daq_storage::{CacheMode, SharedCache};
