//! Snapshot and export layout.
//!
//! The cache never writes files. An external writer takes a [`CacheSnapshot`]
//! and uses its [`ExportLayout`] to lay the records out: one stacked frame
//! array, one column per metadata channel and one stacked array per derived
//! quantity.

use daq_core::SyncRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shape and naming contract for exporting a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLayout {
    /// Cache mode the snapshot came from (`ring`, `scan`, `bins`).
    pub mode: String,
    /// Configured capacity (total across bins).
    pub capacity: usize,
    /// Number of records in the snapshot.
    pub record_count: usize,
    /// Row-major shape of one frame, from the oldest record.
    pub frame_shape: Option<Vec<usize>>,
    /// Dtype name of the frame array (`uint16`, `float32`, ...).
    pub element_type: Option<String>,
    /// Metadata channel names, sorted.
    pub channels: Vec<String>,
    /// Derived array names with their per-record shape.
    pub derived: BTreeMap<String, Vec<usize>>,
    /// Records per bin, bin mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_counts: Option<Vec<usize>>,
}

impl ExportLayout {
    pub(crate) fn describe(
        mode: &str,
        capacity: usize,
        records: &[Arc<SyncRecord>],
        bin_counts: Option<Vec<usize>>,
    ) -> Self {
        let first = records.first();
        Self {
            mode: mode.to_string(),
            capacity,
            record_count: records.len(),
            frame_shape: first.map(|r| r.array.shape().to_vec()),
            element_type: first.map(|r| r.array.element_type().dtype_name().to_string()),
            channels: first
                .map(|r| r.attributes.keys().cloned().collect())
                .unwrap_or_default(),
            derived: first
                .map(|r| {
                    r.derived
                        .iter()
                        .map(|(name, array)| (name.clone(), array.shape().to_vec()))
                        .collect()
                })
                .unwrap_or_default(),
            bin_counts,
        }
    }

    /// Serialize to pretty JSON for the external writer.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Consistent point-in-time copy of the cache.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// Records oldest-first (bin mode: bin 0 first, each bin oldest-first).
    pub records: Vec<Arc<SyncRecord>>,
    /// Layout describing `records`.
    pub layout: ExportLayout,
}

impl CacheSnapshot {
    /// Values of one channel across the snapshot, `None` where nothing was attached.
    pub fn channel_series(&self, channel: &str) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.value_f64(channel)).collect()
    }

    /// Sequence ids in snapshot order.
    pub fn sequence_ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.sequence_id).collect()
    }

    /// Frames stacked into one flat `f64` buffer of shape `[n, ..frame_shape]`.
    ///
    /// Returns `None` when frames disagree on shape.
    pub fn stacked_frames_f64(&self) -> Option<Vec<f64>> {
        let shape = self.layout.frame_shape.as_deref()?;
        let mut out = Vec::new();
        for record in &self.records {
            if record.array.shape() != shape {
                return None;
            }
            out.extend_from_slice(&record.array.data().as_f64());
        }
        Some(out)
    }
}
