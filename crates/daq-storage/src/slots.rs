//! Fixed-capacity record ring.
//!
//! Slots are allocated once at construction. Insertion writes the slot under
//! the head counter and advances it modulo the capacity, so a full ring
//! overwrites its oldest record without shifting or copying the others.

use daq_core::SyncRecord;
use std::sync::Arc;

/// Circular buffer of shared records, oldest-first eviction.
#[derive(Debug, Clone)]
pub struct RecordRing {
    slots: Vec<Option<Arc<SyncRecord>>>,
    /// Index of the next slot to write.
    head: usize,
    len: usize,
}

impl RecordRing {
    /// Ring with `capacity` pre-allocated slots. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Store a record, returning the evicted oldest record when full.
    pub fn push(&mut self, record: Arc<SyncRecord>) -> Option<Arc<SyncRecord>> {
        let capacity = self.slots.len();
        if capacity == 0 {
            return Some(record);
        }
        let evicted = self.slots[self.head].replace(record);
        self.head = (self.head + 1) % capacity;
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no record is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the next push evicts.
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SyncRecord>> + '_ {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity.max(1);
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// Point-in-time copy of the stored records, oldest-first.
    pub fn snapshot(&self) -> Vec<Arc<SyncRecord>> {
        self.iter().cloned().collect()
    }

    /// Drop every record, keeping the slots allocated.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use daq_core::{DecodedArray, Timestamp, TypedBuffer};
    use std::collections::BTreeMap;

    pub(crate) fn record(sequence_id: i64) -> Arc<SyncRecord> {
        Arc::new(SyncRecord {
            sequence_id,
            timestamp: Timestamp::new(sequence_id, 0),
            stream_position: sequence_id.max(0) as u64 + 1,
            array: DecodedArray::flat(TypedBuffer::U16(vec![sequence_id as u16; 4])),
            attributes: BTreeMap::new(),
            degraded: false,
            derived: BTreeMap::new(),
        })
    }

    fn ids(ring: &RecordRing) -> Vec<i64> {
        ring.iter().map(|r| r.sequence_id).collect()
    }

    #[test]
    fn test_fill_without_eviction() {
        let mut ring = RecordRing::new(3);
        assert!(ring.is_empty());
        for id in 0..3 {
            assert!(ring.push(record(id)).is_none());
        }
        assert!(ring.is_full());
        assert_eq!(ids(&ring), vec![0, 1, 2]);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = RecordRing::new(3);
        let evicted: Vec<i64> = (0..7)
            .filter_map(|id| ring.push(record(id)))
            .map(|r| r.sequence_id)
            .collect();
        assert_eq!(evicted, vec![0, 1, 2, 3]);
        assert_eq!(ids(&ring), vec![4, 5, 6]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_snapshot_shares_records() {
        let mut ring = RecordRing::new(2);
        let first = record(1);
        ring.push(Arc::clone(&first));
        let snapshot = ring.snapshot();
        assert!(Arc::ptr_eq(&snapshot[0], &first));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut ring = RecordRing::new(4);
        ring.push(record(1));
        ring.push(record(2));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
        ring.push(record(3));
        assert_eq!(ids(&ring), vec![3]);
    }
}
