//! Live-preview record taps.
//!
//! A tap receives every Nth emitted record over a bounded async channel.
//! Delivery uses `try_send`: a slow consumer loses records, the frame path
//! never waits on it. Records are shared `Arc`s, so delivering to several
//! taps does not copy pixel data.

use crate::error::CacheError;
use daq_core::SyncRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default channel capacity for tap consumers (number of records buffered)
pub const DEFAULT_TAP_CHANNEL_SIZE: usize = 16;

/// A tap consumer that receives every Nth record.
#[derive(Debug)]
pub struct TapConsumer {
    /// Unique identifier for this tap
    pub id: String,

    /// Deliver every nth record (1 = every record, 10 = every 10th record)
    pub nth_record: usize,

    record_count: AtomicU64,
    sender: mpsc::Sender<Arc<SyncRecord>>,
    dropped_records: AtomicU64,
}

impl TapConsumer {
    /// Create a new tap consumer
    pub fn new(id: String, nth_record: usize, sender: mpsc::Sender<Arc<SyncRecord>>) -> Self {
        Self {
            id,
            nth_record: nth_record.max(1),
            record_count: AtomicU64::new(0),
            sender,
            dropped_records: AtomicU64::new(0),
        }
    }

    /// Check if this record should be delivered based on `nth_record`
    pub fn should_deliver(&self) -> bool {
        let count = self.record_count.fetch_add(1, Ordering::Relaxed);
        count % self.nth_record as u64 == 0
    }

    /// Attempt to send a record without blocking.
    /// Returns true if sent, false if dropped due to backpressure or a closed receiver.
    pub fn try_send_record(&self, record: Arc<SyncRecord>) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_records.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Records dropped because the consumer fell behind
    pub fn dropped_count(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registry of active record taps
#[derive(Debug, Default)]
pub struct RecordTapRegistry {
    taps: RwLock<HashMap<String, Arc<TapConsumer>>>,
}

impl RecordTapRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tap with the default channel size.
    pub fn register(
        &self,
        id: impl Into<String>,
        nth_record: usize,
    ) -> Result<mpsc::Receiver<Arc<SyncRecord>>, CacheError> {
        self.register_with_capacity(id, nth_record, DEFAULT_TAP_CHANNEL_SIZE)
    }

    /// Register a new tap buffering up to `capacity` records.
    pub fn register_with_capacity(
        &self,
        id: impl Into<String>,
        nth_record: usize,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Arc<SyncRecord>>, CacheError> {
        let id = id.into();
        let mut taps = self.taps.write();
        if taps.contains_key(&id) {
            return Err(CacheError::DuplicateTap(id));
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        tracing::debug!(tap_id = %id, nth_record, "Registering record tap");
        taps.insert(id.clone(), Arc::new(TapConsumer::new(id, nth_record, tx)));
        Ok(rx)
    }

    /// Unregister a tap. Returns `true` if it existed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.taps.write().remove(id).is_some();
        if removed {
            tracing::debug!(tap_id = %id, "Unregistered record tap");
        }
        removed
    }

    /// Offer a record to every tap.
    ///
    /// Taps whose receiver was dropped are pruned.
    pub fn notify_all(&self, record: &Arc<SyncRecord>) {
        let mut closed = Vec::new();
        {
            let taps = self.taps.read();
            if taps.is_empty() {
                return;
            }
            for tap in taps.values() {
                if tap.is_closed() {
                    closed.push(tap.id.clone());
                    continue;
                }
                if tap.should_deliver() && !tap.try_send_record(Arc::clone(record)) {
                    tracing::trace!(tap_id = %tap.id, "Record tap full, dropping record");
                }
            }
        }
        if !closed.is_empty() {
            let mut taps = self.taps.write();
            for id in closed {
                tracing::debug!(tap_id = %id, "Pruning closed record tap");
                taps.remove(&id);
            }
        }
    }

    /// Get count of active taps
    pub fn count(&self) -> usize {
        self.taps.read().len()
    }

    /// List all taps as `(id, nth_record)`.
    pub fn list(&self) -> Vec<(String, usize)> {
        let mut taps: Vec<_> = self
            .taps
            .read()
            .values()
            .map(|t| (t.id.clone(), t.nth_record))
            .collect();
        taps.sort();
        taps
    }

    /// Records dropped by a tap due to backpressure.
    pub fn dropped_count(&self, id: &str) -> Option<u64> {
        self.taps.read().get(id).map(|t| t.dropped_count())
    }
}
