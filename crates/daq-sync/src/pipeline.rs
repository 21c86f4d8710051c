//! Frame synchronization pipeline.
//!
//! Every frame walks the same state machine:
//!
//! ```text
//! Idle -> Decoding -> GapChecking -> Associating -> Caching -> Emitted
//!            |                                        |
//!            +--------------> Dropped <---------------+
//!        (decode/shape)                         (scan overflow)
//! ```
//!
//! A dropped frame still advances the gap detector and counts as missed, so
//! bin routing stays aligned with the stream. Only scan overflow and bursts of
//! consecutive decode failures surface as errors; everything else a bad frame
//! causes lands in [`PipelineStats`].
//!
//! The pipeline is single-writer: one context calls
//! [`SyncPipeline::process_frame`] in arrival order. Metadata publishers only
//! touch the shared [`MetadataInbox`].

use crate::association::{AssociationEngine, MetadataInbox};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gap::SequenceGapDetector;
use crate::stats::{PipelineStats, StatsSnapshot};
use daq_codec::CodecError;
use daq_core::{DaqError, DecodedArray, Frame, SyncRecord};
use daq_storage::{Admission, CacheError, CallbackHandle, RecordTapRegistry, SharedCache};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Stage of the frame currently (or last) processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting for a frame.
    Idle,
    /// Decompressing the payload.
    Decoding,
    /// Comparing the sequence id with the previous one.
    GapChecking,
    /// Pairing the frame with metadata values.
    Associating,
    /// Offering the record to the cache.
    Caching,
    /// Record built and handed to taps.
    Emitted,
    /// Frame discarded; see the drop reason.
    Dropped,
}

impl FrameState {
    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::Decoding => "decoding",
            FrameState::GapChecking => "gap_checking",
            FrameState::Associating => "associating",
            FrameState::Caching => "caching",
            FrameState::Emitted => "emitted",
            FrameState::Dropped => "dropped",
        }
    }

    /// `Emitted` or `Dropped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, FrameState::Emitted | FrameState::Dropped)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame was dropped without an error being raised.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The payload did not decode.
    Decode(CodecError),
    /// The decoded buffer does not fit the declared dimensions.
    Shape(DaqError),
}

impl DropReason {
    fn into_codec_error(self) -> CodecError {
        match self {
            DropReason::Decode(err) => err,
            DropReason::Shape(err) => CodecError::Limit(err),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Decode(err) => write!(f, "decode failure: {err}"),
            DropReason::Shape(err) => write!(f, "shape error: {err}"),
        }
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    /// A record was built. `admission` says whether the cache kept it.
    Emitted {
        /// The synchronized record.
        record: Arc<SyncRecord>,
        /// What the cache did with it.
        admission: Admission,
        /// Frame ids skipped just before this frame.
        gap: u32,
    },
    /// The frame was counted as missed and discarded.
    Dropped {
        /// Id of the dropped frame.
        sequence_id: i64,
        /// Why it was dropped.
        reason: DropReason,
    },
}

impl PipelineOutput {
    /// Emitted record, if any.
    pub fn record(&self) -> Option<&Arc<SyncRecord>> {
        match self {
            PipelineOutput::Emitted { record, .. } => Some(record),
            PipelineOutput::Dropped { .. } => None,
        }
    }

    /// True for [`PipelineOutput::Emitted`].
    pub fn is_emitted(&self) -> bool {
        matches!(self, PipelineOutput::Emitted { .. })
    }
}

/// Decode, gap-check, associate and cache frames from one stream.
pub struct SyncPipeline {
    gap: SequenceGapDetector,
    association: AssociationEngine,
    cache: SharedCache,
    taps: Arc<RecordTapRegistry>,
    stats: Arc<PipelineStats>,
    burst_threshold: u32,
    consecutive_failures: u32,
    state: FrameState,
}

impl fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("state", &self.state)
            .field("cache_len", &self.cache.len())
            .field("taps", &self.taps.count())
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

impl SyncPipeline {
    /// Validate `config` and allocate every component.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let association =
            AssociationEngine::new(config.channel_policies(), config.queue_capacity)?;
        let cache = SharedCache::from_mode(config.cache.clone())?;
        let stats = Arc::new(PipelineStats::new(
            association.channel_names(),
            association.inbox(),
        ));
        tracing::info!(
            channels = config.channels.len(),
            cache_mode = config.cache.name(),
            capacity = cache.capacity(),
            "Sync pipeline created"
        );
        Ok(Self {
            gap: SequenceGapDetector::new(),
            association,
            cache,
            taps: Arc::new(RecordTapRegistry::new()),
            stats,
            burst_threshold: config.decode_burst_threshold,
            consecutive_failures: 0,
            state: FrameState::Idle,
        })
    }

    /// Process a frame with no derived arrays.
    pub fn process_frame(&mut self, frame: Frame) -> SyncResult<PipelineOutput> {
        self.process_frame_with_derived(frame, BTreeMap::new())
    }

    /// Process a frame, attaching `derived` arrays to its record unchanged.
    pub fn process_frame_with_derived(
        &mut self,
        frame: Frame,
        derived: BTreeMap<String, DecodedArray>,
    ) -> SyncResult<PipelineOutput> {
        let sequence_id = frame.sequence_id;
        self.transition(sequence_id, FrameState::Idle);
        self.transition(sequence_id, FrameState::Decoding);

        let array = match decode(&frame) {
            Ok(array) => array,
            Err(reason) => return self.drop_undecodable(sequence_id, reason),
        };
        self.consecutive_failures = 0;
        self.stats.record_received(Instant::now());

        self.transition(sequence_id, FrameState::GapChecking);
        let gap = self.check_gap(sequence_id);
        self.stats.record_missed(u64::from(gap));
        let stream_position = self.stats.stream_position();

        self.transition(sequence_id, FrameState::Associating);
        let association = self.association.associate_all(frame.timestamp);
        for (channel, attribute) in &association.attributes {
            self.stats.record_outcome(channel, attribute.outcome);
        }
        if association.degraded {
            tracing::debug!(sequence_id, "Frame degraded: not every channel associated");
        }

        let record = Arc::new(SyncRecord {
            sequence_id,
            timestamp: frame.timestamp,
            stream_position,
            array,
            attributes: association.attributes,
            degraded: association.degraded,
            derived,
        });

        self.transition(sequence_id, FrameState::Caching);
        let admission = match self.cache.insert(Arc::clone(&record)) {
            Ok(admission) => admission,
            Err(err) => {
                if matches!(err, CacheError::ScanOverflow { .. }) {
                    self.stats.record_scan_overflow();
                }
                self.stats.record_dropped();
                self.transition(sequence_id, FrameState::Dropped);
                return Err(err.into());
            }
        };
        self.stats.record_admission(admission);
        self.stats.record_emitted(record.degraded);
        self.taps.notify_all(&record);

        self.transition(sequence_id, FrameState::Emitted);
        Ok(PipelineOutput::Emitted {
            record,
            admission,
            gap,
        })
    }

    fn drop_undecodable(
        &mut self,
        sequence_id: i64,
        reason: DropReason,
    ) -> SyncResult<PipelineOutput> {
        tracing::warn!(sequence_id, reason = %reason, "Dropping frame");
        self.stats.record_decode_failure();
        self.stats.record_dropped();

        // The dropped frame itself is missed, on top of any gap before it.
        let gap = self.check_gap(sequence_id);
        self.stats.record_missed(u64::from(gap) + 1);

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.transition(sequence_id, FrameState::Dropped);

        if self.consecutive_failures == self.burst_threshold {
            self.stats.record_decode_burst();
            tracing::error!(
                sequence_id,
                consecutive = self.consecutive_failures,
                "Decode failure burst"
            );
            return Err(SyncError::DecodeFailureBurst {
                consecutive: self.consecutive_failures,
                sequence_id,
                last_error: reason.into_codec_error(),
            });
        }
        Ok(PipelineOutput::Dropped {
            sequence_id,
            reason,
        })
    }

    fn check_gap(&mut self, sequence_id: i64) -> u32 {
        let anomalies = self.gap.anomalies();
        let gap = self.gap.observe(sequence_id);
        if gap > 0 {
            self.stats.record_gap_event();
        }
        if self.gap.anomalies() > anomalies {
            self.stats.record_anomaly();
        }
        gap
    }

    fn transition(&mut self, sequence_id: i64, next: FrameState) {
        tracing::debug!(sequence_id, from = %self.state, to = %next, "Frame state");
        self.state = next;
    }

    /// Clear statistics, gap detector, association slots and cache.
    ///
    /// Registered taps and scan-complete callbacks are kept.
    pub fn reset(&mut self) {
        self.gap.reset();
        self.association.clear_slots();
        self.cache.reset();
        self.stats.reset();
        self.consecutive_failures = 0;
        self.state = FrameState::Idle;
        tracing::info!("Sync pipeline reset");
    }

    /// State reached by the last frame.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Inbox shared with metadata publishers.
    pub fn inbox(&self) -> Arc<MetadataInbox> {
        self.association.inbox()
    }

    /// Cache handle for exporters.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Register a zero-argument callback fired once per completed scan.
    pub fn on_scan_complete(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackHandle {
        self.cache.on_scan_complete(callback)
    }

    /// Live preview taps.
    pub fn taps(&self) -> Arc<RecordTapRegistry> {
        Arc::clone(&self.taps)
    }

    /// Receive every `nth_record` emitted record on a bounded channel.
    pub fn register_tap(
        &self,
        id: impl Into<String>,
        nth_record: usize,
    ) -> SyncResult<mpsc::Receiver<Arc<SyncRecord>>> {
        Ok(self.taps.register(id, nth_record)?)
    }

    /// Live statistics handle.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Copy of the current statistics.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

fn decode(frame: &Frame) -> Result<DecodedArray, DropReason> {
    let buffer = daq_codec::decode_frame(frame).map_err(DropReason::Decode)?;
    DecodedArray::from_detector_dims(&frame.shape, buffer).map_err(DropReason::Shape)
}
