//! Bounded record cache.
//!
//! Three topologies, fixed at construction:
//!
//! - **Ring**: one ring; a full ring evicts its oldest record.
//! - **Scan**: records are stored only while a boolean gating channel is
//!   active. When the gate closes the scan is complete: callbacks fire once
//!   and further records are refused until the gate opens again. Filling the
//!   capacity during a scan is [`CacheError::ScanOverflow`].
//! - **Bins**: `N` rings; a record goes to bin `(stream_position - 1) % N`,
//!   where `stream_position` counts received plus missed frames.
//!
//! [`CacheManager`] is single-writer state. [`SharedCache`] wraps it in a
//! mutex for exporters and fires scan-complete callbacks after the lock is
//! released, so a callback may take a snapshot.

use crate::callbacks::{CallbackHandle, ScanCompleteRegistry};
use crate::error::CacheError;
use crate::export::{CacheSnapshot, ExportLayout};
use crate::slots::RecordRing;
use daq_core::limits::MAX_CACHE_RECORDS;
use daq_core::{DaqError, SyncRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_active_value() -> bool {
    true
}

/// Cache topology and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CacheMode {
    /// Continuous ring of `capacity` records.
    Ring {
        /// Records kept.
        capacity: usize,
    },
    /// Gated scan of at most `capacity` records.
    Scan {
        /// Records per scan.
        capacity: usize,
        /// Boolean metadata channel carrying the gate.
        gate_channel: String,
        /// Gate reading that means "acquiring".
        #[serde(default = "default_active_value")]
        active_value: bool,
    },
    /// `bins` rings of `capacity` records each.
    Bins {
        /// Records per bin.
        capacity: usize,
        /// Number of bins.
        bins: usize,
    },
}

impl CacheMode {
    /// Mode name as used in configuration and export layouts.
    pub fn name(&self) -> &'static str {
        match self {
            CacheMode::Ring { .. } => "ring",
            CacheMode::Scan { .. } => "scan",
            CacheMode::Bins { .. } => "bins",
        }
    }

    /// Gating channel, scan mode only.
    pub fn gate_channel(&self) -> Option<&str> {
        match self {
            CacheMode::Scan { gate_channel, .. } => Some(gate_channel),
            _ => None,
        }
    }

    /// Check the parameters before any slot is allocated.
    pub fn validate(&self) -> Result<(), DaqError> {
        let capacity = match self {
            CacheMode::Ring { capacity } => *capacity,
            CacheMode::Scan {
                capacity,
                gate_channel,
                ..
            } => {
                if gate_channel.trim().is_empty() {
                    return Err(DaqError::Configuration(
                        "scan mode requires a gate_channel".into(),
                    ));
                }
                *capacity
            }
            CacheMode::Bins { capacity, bins } => {
                if *bins == 0 {
                    return Err(DaqError::Configuration("bin count must be > 0".into()));
                }
                capacity.checked_mul(*bins).ok_or_else(|| {
                    DaqError::Configuration("bins * capacity overflows".into())
                })?
            }
        };
        if capacity == 0 {
            return Err(DaqError::Configuration("cache capacity must be > 0".into()));
        }
        if capacity > MAX_CACHE_RECORDS {
            return Err(DaqError::Configuration(format!(
                "cache capacity {capacity} exceeds maximum {MAX_CACHE_RECORDS}"
            )));
        }
        Ok(())
    }
}

impl Default for CacheMode {
    fn default() -> Self {
        CacheMode::Ring { capacity: 1000 }
    }
}

/// What happened to an inserted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored without displacing anything.
    Stored,
    /// Stored; the oldest record of its ring was evicted.
    StoredWithEviction,
    /// Scan gate not active; the record was not cached.
    NotGated,
}

impl Admission {
    /// Whether the record was cached.
    pub fn is_stored(self) -> bool {
        !matches!(self, Admission::NotGated)
    }
}

/// Result of [`CacheManager::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Admission of the record.
    pub admission: Admission,
    /// This record closed the gate; scan-complete callbacks are due.
    pub scan_complete: bool,
}

impl Insertion {
    fn plain(admission: Admission) -> Self {
        Self {
            admission,
            scan_complete: false,
        }
    }
}

/// Gating phase of a scan cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Waiting for the first start.
    Armed,
    /// Gate open, records stored.
    Acquiring,
    /// Gate closed after a scan; records kept until the next start.
    Complete,
}

#[derive(Debug)]
enum Storage {
    Ring(RecordRing),
    Scan {
        ring: RecordRing,
        gate_channel: String,
        active_value: bool,
        phase: ScanPhase,
    },
    Bins(Vec<RecordRing>),
}

/// Mode-specific bounded storage for synchronized records.
#[derive(Debug)]
pub struct CacheManager {
    mode: CacheMode,
    storage: Storage,
}

impl CacheManager {
    /// Build a cache, allocating every slot up front.
    pub fn new(mode: CacheMode) -> Result<Self, DaqError> {
        mode.validate()?;
        let storage = match &mode {
            CacheMode::Ring { capacity } => Storage::Ring(RecordRing::new(*capacity)),
            CacheMode::Scan {
                capacity,
                gate_channel,
                active_value,
            } => Storage::Scan {
                ring: RecordRing::new(*capacity),
                gate_channel: gate_channel.clone(),
                active_value: *active_value,
                phase: ScanPhase::Armed,
            },
            CacheMode::Bins { capacity, bins } => {
                Storage::Bins((0..*bins).map(|_| RecordRing::new(*capacity)).collect())
            }
        };
        tracing::debug!(mode = mode.name(), "Cache allocated");
        Ok(Self { mode, storage })
    }

    /// Configured mode.
    pub fn mode(&self) -> &CacheMode {
        &self.mode
    }

    /// Insert a record according to the cache mode.
    pub fn insert(&mut self, record: Arc<SyncRecord>) -> Result<Insertion, CacheError> {
        match &mut self.storage {
            Storage::Ring(ring) => Ok(Insertion::plain(push(ring, record))),
            Storage::Scan {
                ring,
                gate_channel,
                active_value,
                phase,
            } => {
                let open = gate_open(&record, gate_channel, *active_value);
                match (*phase, open) {
                    (ScanPhase::Armed | ScanPhase::Complete, false) => {
                        Ok(Insertion::plain(Admission::NotGated))
                    }
                    (ScanPhase::Armed | ScanPhase::Complete, true) => {
                        if !ring.is_empty() {
                            tracing::debug!(
                                discarded = ring.len(),
                                "New scan started, clearing previous scan"
                            );
                            ring.clear();
                        }
                        *phase = ScanPhase::Acquiring;
                        tracing::info!(sequence_id = record.sequence_id, "Scan started");
                        Ok(Insertion::plain(push(ring, record)))
                    }
                    (ScanPhase::Acquiring, true) => {
                        if ring.is_full() {
                            tracing::warn!(
                                sequence_id = record.sequence_id,
                                capacity = ring.capacity(),
                                "Scan overflow, record dropped"
                            );
                            return Err(CacheError::ScanOverflow {
                                capacity: ring.capacity(),
                                sequence_id: record.sequence_id,
                            });
                        }
                        Ok(Insertion::plain(push(ring, record)))
                    }
                    (ScanPhase::Acquiring, false) => {
                        *phase = ScanPhase::Complete;
                        tracing::info!(
                            sequence_id = record.sequence_id,
                            records = ring.len(),
                            "Scan stopped"
                        );
                        Ok(Insertion {
                            admission: Admission::NotGated,
                            scan_complete: true,
                        })
                    }
                }
            }
            Storage::Bins(bins) => {
                let index = bin_index(record.stream_position, bins.len());
                Ok(Insertion::plain(push(&mut bins[index], record)))
            }
        }
    }

    /// Total number of cached records.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Ring(ring) | Storage::Scan { ring, .. } => ring.len(),
            Storage::Bins(bins) => bins.iter().map(RecordRing::len).sum(),
        }
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity (per-bin capacity times bin count in bin mode).
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Ring(ring) | Storage::Scan { ring, .. } => ring.capacity(),
            Storage::Bins(bins) => bins.iter().map(RecordRing::capacity).sum(),
        }
    }

    /// Scan phase, scan mode only.
    pub fn scan_phase(&self) -> Option<ScanPhase> {
        match &self.storage {
            Storage::Scan { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Point-in-time copy of every cached record.
    ///
    /// Oldest-first; in bin mode bins are concatenated in index order.
    pub fn drain_snapshot(&self) -> Vec<Arc<SyncRecord>> {
        match &self.storage {
            Storage::Ring(ring) | Storage::Scan { ring, .. } => ring.snapshot(),
            Storage::Bins(bins) => bins.iter().flat_map(|b| b.iter().cloned()).collect(),
        }
    }

    /// Records plus their export layout.
    pub fn snapshot(&self) -> CacheSnapshot {
        let records = self.drain_snapshot();
        let bin_counts = match &self.storage {
            Storage::Bins(bins) => Some(bins.iter().map(RecordRing::len).collect()),
            _ => None,
        };
        let layout = ExportLayout::describe(self.mode.name(), self.capacity(), &records, bin_counts);
        CacheSnapshot { records, layout }
    }

    /// Records of one bin, oldest-first.
    pub fn bin_snapshot(&self, bin: usize) -> Result<Vec<Arc<SyncRecord>>, CacheError> {
        match &self.storage {
            Storage::Bins(bins) => bins
                .get(bin)
                .map(RecordRing::snapshot)
                .ok_or(CacheError::BinOutOfRange {
                    bin,
                    bins: bins.len(),
                }),
            _ => Err(CacheError::NotBinned {
                mode: self.mode.name(),
            }),
        }
    }

    /// Clear storage and re-arm gating.
    pub fn reset(&mut self) {
        match &mut self.storage {
            Storage::Ring(ring) => ring.clear(),
            Storage::Scan { ring, phase, .. } => {
                ring.clear();
                *phase = ScanPhase::Armed;
            }
            Storage::Bins(bins) => bins.iter_mut().for_each(RecordRing::clear),
        }
        tracing::debug!(mode = self.mode.name(), "Cache reset");
    }
}

fn push(ring: &mut RecordRing, record: Arc<SyncRecord>) -> Admission {
    match ring.push(record) {
        Some(evicted) => {
            tracing::trace!(evicted = evicted.sequence_id, "Cache evicted oldest record");
            Admission::StoredWithEviction
        }
        None => Admission::Stored,
    }
}

/// Bin for a 1-based stream position.
pub fn bin_index(stream_position: u64, bins: usize) -> usize {
    (stream_position.saturating_sub(1) % bins.max(1) as u64) as usize
}

/// Whether a record's gating attribute reads as `active_value`.
///
/// A missing channel, or one with no attached value, reads as closed.
pub fn gate_open(record: &SyncRecord, gate_channel: &str, active_value: bool) -> bool {
    record
        .value(gate_channel)
        .and_then(|v| v.as_bool())
        .is_some_and(|reading| reading == active_value)
}

/// Cache shared between the frame path and exporters.
///
/// Cloning shares the same cache and callback registry.
#[derive(Debug, Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<CacheManager>>,
    scan_complete: Arc<ScanCompleteRegistry>,
}

impl SharedCache {
    /// Wrap a cache manager.
    pub fn new(manager: CacheManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
            scan_complete: Arc::new(ScanCompleteRegistry::new()),
        }
    }

    /// Build from a mode.
    pub fn from_mode(mode: CacheMode) -> Result<Self, DaqError> {
        Ok(Self::new(CacheManager::new(mode)?))
    }

    /// Insert a record; fires scan-complete callbacks after releasing the lock.
    pub fn insert(&self, record: Arc<SyncRecord>) -> Result<Admission, CacheError> {
        let insertion = self.inner.lock().insert(record)?;
        if insertion.scan_complete {
            self.scan_complete.fire();
        }
        Ok(insertion.admission)
    }

    /// Register a scan-complete callback.
    pub fn on_scan_complete(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackHandle {
        self.scan_complete.register(callback)
    }

    /// Unregister a scan-complete callback.
    pub fn remove_scan_complete(&self, handle: CallbackHandle) -> bool {
        self.scan_complete.unregister(handle)
    }

    /// Number of completed scans.
    pub fn scans_completed(&self) -> u64 {
        self.scan_complete.fired_count()
    }

    /// Total number of cached records.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Point-in-time copy of every cached record.
    pub fn drain_snapshot(&self) -> Vec<Arc<SyncRecord>> {
        self.inner.lock().drain_snapshot()
    }

    /// Records plus their export layout.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.lock().snapshot()
    }

    /// Records of one bin.
    pub fn bin_snapshot(&self, bin: usize) -> Result<Vec<Arc<SyncRecord>>, CacheError> {
        self.inner.lock().bin_snapshot(bin)
    }

    /// Scan phase, scan mode only.
    pub fn scan_phase(&self) -> Option<ScanPhase> {
        self.inner.lock().scan_phase()
    }

    /// Configured mode.
    pub fn mode(&self) -> CacheMode {
        self.inner.lock().mode().clone()
    }

    /// Clear storage and re-arm gating.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::tests::record;
    use daq_core::{AssociationOutcome, ChannelAttribute, MetadataValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gated(sequence_id: i64, gate: Option<MetadataValue>) -> Arc<SyncRecord> {
        let mut r = (*record(sequence_id)).clone();
        let attribute = match gate {
            Some(value) => ChannelAttribute {
                outcome: AssociationOutcome::Matched,
                value: Some(value),
                value_timestamp: None,
            },
            None => ChannelAttribute::empty(AssociationOutcome::ChannelMissing),
        };
        r.attributes.insert("scan_on".to_string(), attribute);
        Arc::new(r)
    }

    fn scan_mode(capacity: usize) -> CacheMode {
        CacheMode::Scan {
            capacity,
            gate_channel: "scan_on".into(),
            active_value: true,
        }
    }

    fn ids(records: &[Arc<SyncRecord>]) -> Vec<i64> {
        records.iter().map(|r| r.sequence_id).collect()
    }

    #[test]
    fn test_validation_rejects_bad_modes() {
        assert!(CacheManager::new(CacheMode::Ring { capacity: 0 }).is_err());
        assert!(CacheManager::new(CacheMode::Bins {
            capacity: 4,
            bins: 0
        })
        .is_err());
        assert!(CacheManager::new(CacheMode::Scan {
            capacity: 4,
            gate_channel: " ".into(),
            active_value: true
        })
        .is_err());
        assert!(CacheManager::new(CacheMode::Ring {
            capacity: MAX_CACHE_RECORDS + 1
        })
        .is_err());
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut cache = CacheManager::new(CacheMode::Ring { capacity: 5 }).unwrap();
        let admissions: Vec<_> = (0..8)
            .map(|id| cache.insert(record(id)).unwrap().admission)
            .collect();
        assert_eq!(admissions[4], Admission::Stored);
        assert_eq!(admissions[5], Admission::StoredWithEviction);
        assert_eq!(cache.len(), 5);
        assert_eq!(ids(&cache.drain_snapshot()), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_scan_ignores_records_before_start() {
        let mut cache = CacheManager::new(scan_mode(10)).unwrap();
        let insertion = cache.insert(gated(0, Some(false.into()))).unwrap();
        assert_eq!(insertion.admission, Admission::NotGated);
        assert!(!insertion.scan_complete);
        assert_eq!(cache.insert(gated(1, None)).unwrap().admission, Admission::NotGated);
        assert!(cache.is_empty());
        assert_eq!(cache.scan_phase(), Some(ScanPhase::Armed));
    }

    #[test]
    fn test_scan_completes_once_per_interval() {
        let mut cache = CacheManager::new(scan_mode(10)).unwrap();
        cache.insert(gated(0, Some(true.into()))).unwrap();
        cache.insert(gated(1, Some(1.0.into()))).unwrap();

        let stop = cache.insert(gated(2, Some(false.into()))).unwrap();
        assert!(stop.scan_complete);
        assert_eq!(stop.admission, Admission::NotGated);

        let after = cache.insert(gated(3, Some(false.into()))).unwrap();
        assert!(!after.scan_complete);
        assert_eq!(ids(&cache.drain_snapshot()), vec![0, 1]);
        assert_eq!(cache.scan_phase(), Some(ScanPhase::Complete));
    }

    #[test]
    fn test_new_start_clears_previous_scan() {
        let mut cache = CacheManager::new(scan_mode(10)).unwrap();
        cache.insert(gated(0, Some(true.into()))).unwrap();
        cache.insert(gated(1, Some(false.into()))).unwrap();
        assert_eq!(cache.len(), 1);

        cache.insert(gated(2, Some("on".into()))).unwrap();
        assert_eq!(ids(&cache.drain_snapshot()), vec![2]);
    }

    #[test]
    fn test_scan_overflow_leaves_prior_records() {
        let mut cache = CacheManager::new(scan_mode(3)).unwrap();
        for id in 0..3 {
            cache.insert(gated(id, Some(true.into()))).unwrap();
        }
        let err = cache.insert(gated(3, Some(true.into()))).unwrap_err();
        assert_eq!(
            err,
            CacheError::ScanOverflow {
                capacity: 3,
                sequence_id: 3
            }
        );
        assert_eq!(ids(&cache.drain_snapshot()), vec![0, 1, 2]);
    }

    #[test]
    fn test_inverted_active_value() {
        let mut cache = CacheManager::new(CacheMode::Scan {
            capacity: 4,
            gate_channel: "scan_on".into(),
            active_value: false,
        })
        .unwrap();
        assert_eq!(
            cache.insert(gated(0, Some(false.into()))).unwrap().admission,
            Admission::Stored
        );
        assert!(cache.insert(gated(1, Some(true.into()))).unwrap().scan_complete);
    }

    #[test]
    fn test_failed_gate_reads_closed() {
        let mut r = (*record(0)).clone();
        r.attributes.insert(
            "scan_on".into(),
            ChannelAttribute::empty(AssociationOutcome::Failed),
        );
        assert!(!gate_open(&r, "scan_on", true));
        assert!(!gate_open(&r, "other", true));
    }

    #[test]
    fn test_bins_route_by_stream_position() {
        let mut cache = CacheManager::new(CacheMode::Bins {
            capacity: 2,
            bins: 3,
        })
        .unwrap();
        // record(id) has stream_position id + 1
        for id in 0..9 {
            cache.insert(record(id)).unwrap();
        }
        assert_eq!(ids(&cache.bin_snapshot(0).unwrap()), vec![3, 6]);
        assert_eq!(ids(&cache.bin_snapshot(1).unwrap()), vec![4, 7]);
        assert_eq!(ids(&cache.bin_snapshot(2).unwrap()), vec![5, 8]);
        assert_eq!(cache.capacity(), 6);
        assert_eq!(cache.len(), 6);
        assert_eq!(
            cache.bin_snapshot(3).unwrap_err(),
            CacheError::BinOutOfRange { bin: 3, bins: 3 }
        );
    }

    #[test]
    fn test_bin_snapshot_requires_bin_mode() {
        let cache = CacheManager::new(CacheMode::Ring { capacity: 2 }).unwrap();
        assert_eq!(
            cache.bin_snapshot(0).unwrap_err(),
            CacheError::NotBinned { mode: "ring" }
        );
    }

    #[test]
    fn test_bin_index() {
        assert_eq!(bin_index(1, 4), 0);
        assert_eq!(bin_index(4, 4), 3);
        assert_eq!(bin_index(5, 4), 0);
        assert_eq!(bin_index(0, 4), 0);
    }

    #[test]
    fn test_reset_rearms_scan() {
        let mut cache = CacheManager::new(scan_mode(4)).unwrap();
        cache.insert(gated(0, Some(true.into()))).unwrap();
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.scan_phase(), Some(ScanPhase::Armed));
    }

    #[test]
    fn test_snapshot_layout() {
        let mut cache = CacheManager::new(CacheMode::Bins {
            capacity: 4,
            bins: 2,
        })
        .unwrap();
        for id in 0..3 {
            cache.insert(gated(id, Some(1.0.into()))).unwrap();
        }
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.layout.mode, "bins");
        assert_eq!(snapshot.layout.record_count, 3);
        assert_eq!(snapshot.layout.frame_shape, Some(vec![4]));
        assert_eq!(snapshot.layout.element_type.as_deref(), Some("uint16"));
        assert_eq!(snapshot.layout.channels, vec!["scan_on".to_string()]);
        assert_eq!(snapshot.layout.bin_counts, Some(vec![2, 1]));
        assert_eq!(snapshot.sequence_ids(), vec![0, 2, 1]);
        assert_eq!(snapshot.channel_series("scan_on"), vec![Some(1.0); 3]);
        assert_eq!(snapshot.stacked_frames_f64().map(|v| v.len()), Some(12));

        let json = snapshot.layout.to_json().unwrap();
        let parsed: ExportLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot.layout);
    }

    #[test]
    fn test_shared_cache_fires_callbacks_outside_lock() {
        let cache = SharedCache::from_mode(scan_mode(8)).unwrap();
        let observed = Arc::new(AtomicUsize::new(usize::MAX));

        let exporter = cache.clone();
        let seen = Arc::clone(&observed);
        cache.on_scan_complete(move || {
            // Re-entering the cache would deadlock if the lock were held.
            seen.store(exporter.drain_snapshot().len(), Ordering::SeqCst);
        });

        cache.insert(gated(0, Some(true.into()))).unwrap();
        cache.insert(gated(1, Some(true.into()))).unwrap();
        cache.insert(gated(2, Some(false.into()))).unwrap();

        assert_eq!(observed.load(Ordering::SeqCst), 2);
        assert_eq!(cache.scans_completed(), 1);
    }

    #[test]
    fn test_one_shot_callback_removes_itself() {
        let cache = SharedCache::from_mode(scan_mode(8)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let own_handle = Arc::new(parking_lot::Mutex::new(None::<CallbackHandle>));

        let handle = cache.on_scan_complete({
            let cache = cache.clone();
            let hits = Arc::clone(&hits);
            let own_handle = Arc::clone(&own_handle);
            move || {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = own_handle.lock().take() {
                    cache.remove_scan_complete(handle);
                }
            }
        });
        *own_handle.lock() = Some(handle);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = cache.clone();
        std::thread::spawn(move || {
            for scan in 0..2 {
                worker.insert(gated(scan * 2, Some(true.into()))).unwrap();
                worker.insert(gated(scan * 2 + 1, Some(false.into()))).unwrap();
            }
            done_tx.send(()).unwrap();
        });

        done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("frame path blocked by scan-complete callback");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.scans_completed(), 2);
    }

    #[test]
    fn test_mode_deserializes_from_tagged_table() {
        let mode: CacheMode = serde_json::from_str(
            r#"{"mode": "scan", "capacity": 100, "gate_channel": "scan_on"}"#,
        )
        .unwrap();
        assert_eq!(mode, scan_mode(100));
    }
}
