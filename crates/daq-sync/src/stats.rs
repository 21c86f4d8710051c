//! Pipeline statistics.
//!
//! Counters are atomics written by the frame path and readable from any
//! context. Per-channel association outcomes live in a small table behind a
//! mutex; push-side counts are read straight from the metadata inbox.

use crate::association::MetadataInbox;
use daq_core::limits::FPS_WINDOW;
use daq_core::AssociationOutcome;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Association outcome counts for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    /// Within tolerance.
    pub matched: u64,
    /// Values attached although older than the tolerance allows.
    pub kept_stale: u64,
    /// Value newer than the frame; nothing attached.
    pub failed: u64,
    /// No value ever received.
    pub missing: u64,
}

impl ChannelCounts {
    fn record(&mut self, outcome: AssociationOutcome) {
        match outcome {
            AssociationOutcome::Matched => self.matched += 1,
            AssociationOutcome::KeptStale => self.kept_stale += 1,
            AssociationOutcome::Failed => self.failed += 1,
            AssociationOutcome::ChannelMissing => self.missing += 1,
        }
    }
}

/// Per-channel view in a [`StatsSnapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Association outcome counts.
    #[serde(flatten)]
    pub outcomes: ChannelCounts,
    /// Values accepted by the inbox.
    pub pushes: u64,
    /// Queued values displaced by newer ones.
    pub overflow_drops: u64,
}

/// Serializable point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames decoded successfully.
    pub frames_received: u64,
    /// Records emitted.
    pub frames_emitted: u64,
    /// Frames dropped (decode failure, shape error or scan overflow).
    pub frames_dropped: u64,
    /// Gap total plus frames lost to decode failure.
    pub frames_missed: u64,
    /// Frames whose payload or shape failed to decode.
    pub decode_failures: u64,
    /// Decode failure bursts reported as errors.
    pub decode_bursts: u64,
    /// Emitted records with at least one `Failed` or `ChannelMissing` channel.
    pub degraded_frames: u64,
    /// Frames preceded by a non-zero gap.
    pub gap_events: u64,
    /// Frame ids at or below the last seen id.
    pub sequence_anomalies: u64,
    /// Records stored in the cache.
    pub records_cached: u64,
    /// Records displaced from a full ring.
    pub cache_evictions: u64,
    /// Emitted records the gate kept out of the cache.
    pub not_gated: u64,
    /// Records refused because a scan filled the cache.
    pub scan_overflows: u64,
    /// Frames received within the last rate window.
    pub fps: f64,
    /// Per-channel counts, keyed by channel name.
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

impl StatsSnapshot {
    /// Degraded fraction of emitted records.
    pub fn error_rate(&self) -> f64 {
        if self.frames_emitted == 0 {
            0.0
        } else {
            self.degraded_frames as f64 / self.frames_emitted as f64
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Live pipeline counters.
#[derive(Debug)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
    frames_missed: AtomicU64,
    decode_failures: AtomicU64,
    decode_bursts: AtomicU64,
    degraded_frames: AtomicU64,
    gap_events: AtomicU64,
    sequence_anomalies: AtomicU64,
    records_cached: AtomicU64,
    cache_evictions: AtomicU64,
    not_gated: AtomicU64,
    scan_overflows: AtomicU64,
    channels: Mutex<BTreeMap<String, ChannelCounts>>,
    arrivals: Mutex<VecDeque<Instant>>,
    inbox: Arc<MetadataInbox>,
}

impl PipelineStats {
    /// Counters for the given channels, reading push counts from `inbox`.
    pub fn new<'a>(channels: impl IntoIterator<Item = &'a str>, inbox: Arc<MetadataInbox>) -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_missed: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            decode_bursts: AtomicU64::new(0),
            degraded_frames: AtomicU64::new(0),
            gap_events: AtomicU64::new(0),
            sequence_anomalies: AtomicU64::new(0),
            records_cached: AtomicU64::new(0),
            cache_evictions: AtomicU64::new(0),
            not_gated: AtomicU64::new(0),
            scan_overflows: AtomicU64::new(0),
            channels: Mutex::new(
                channels
                    .into_iter()
                    .map(|name| (name.to_string(), ChannelCounts::default()))
                    .collect(),
            ),
            arrivals: Mutex::new(VecDeque::new()),
            inbox,
        }
    }

    /// Count a decoded frame and note its arrival for the rate estimate.
    pub(crate) fn record_received(&self, now: Instant) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let mut arrivals = self.arrivals.lock();
        arrivals.push_back(now);
        prune(&mut arrivals, now);
    }

    pub(crate) fn record_missed(&self, frames: u64) {
        if frames > 0 {
            self.frames_missed.fetch_add(frames, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_gap_event(&self) {
        self.gap_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_anomaly(&self) {
        self.sequence_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_burst(&self) {
        self.decode_bursts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan_overflow(&self) {
        self.scan_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, channel: &str, outcome: AssociationOutcome) {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_default()
            .record(outcome);
    }

    pub(crate) fn record_emitted(&self, degraded: bool) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_admission(&self, admission: daq_storage::Admission) {
        use daq_storage::Admission;
        match admission {
            Admission::Stored => {
                self.records_cached.fetch_add(1, Ordering::Relaxed);
            }
            Admission::StoredWithEviction => {
                self.records_cached.fetch_add(1, Ordering::Relaxed);
                self.cache_evictions.fetch_add(1, Ordering::Relaxed);
            }
            Admission::NotGated => {
                self.not_gated.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Frames decoded successfully.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames known to be missing.
    #[must_use]
    pub fn frames_missed(&self) -> u64 {
        self.frames_missed.load(Ordering::Relaxed)
    }

    /// Received plus missed: the 1-based position of the latest frame in the stream.
    #[must_use]
    pub fn stream_position(&self) -> u64 {
        self.frames_received() + self.frames_missed()
    }

    /// Frames received within the last [`FPS_WINDOW`].
    pub fn fps(&self) -> f64 {
        let mut arrivals = self.arrivals.lock();
        prune(&mut arrivals, Instant::now());
        arrivals.len() as f64 / FPS_WINDOW.as_secs_f64()
    }

    /// Outcome counts for one channel.
    pub fn channel_counts(&self, channel: &str) -> Option<ChannelCounts> {
        self.channels.lock().get(channel).copied()
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let channels = self
            .channels
            .lock()
            .iter()
            .map(|(name, outcomes)| {
                let inbox = self.inbox.counters(name).unwrap_or_default();
                (
                    name.clone(),
                    ChannelSnapshot {
                        outcomes: *outcomes,
                        pushes: inbox.pushes,
                        overflow_drops: inbox.overflow_drops,
                    },
                )
            })
            .collect();
        StatsSnapshot {
            frames_received: load(&self.frames_received),
            frames_emitted: load(&self.frames_emitted),
            frames_dropped: load(&self.frames_dropped),
            frames_missed: load(&self.frames_missed),
            decode_failures: load(&self.decode_failures),
            decode_bursts: load(&self.decode_bursts),
            degraded_frames: load(&self.degraded_frames),
            gap_events: load(&self.gap_events),
            sequence_anomalies: load(&self.sequence_anomalies),
            records_cached: load(&self.records_cached),
            cache_evictions: load(&self.cache_evictions),
            not_gated: load(&self.not_gated),
            scan_overflows: load(&self.scan_overflows),
            fps: self.fps(),
            channels,
        }
    }

    /// Zero every counter, including the inbox push counts.
    pub fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.frames_emitted,
            &self.frames_dropped,
            &self.frames_missed,
            &self.decode_failures,
            &self.decode_bursts,
            &self.degraded_frames,
            &self.gap_events,
            &self.sequence_anomalies,
            &self.records_cached,
            &self.cache_evictions,
            &self.not_gated,
            &self.scan_overflows,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.channels
            .lock()
            .values_mut()
            .for_each(|counts| *counts = ChannelCounts::default());
        self.arrivals.lock().clear();
        self.inbox.reset_counters();
    }
}

fn prune(arrivals: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = arrivals.front() {
        if now.saturating_duration_since(oldest) > FPS_WINDOW {
            arrivals.pop_front();
        } else {
            break;
        }
    }
}
