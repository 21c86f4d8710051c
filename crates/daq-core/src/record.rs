//! Synchronized output record.

use crate::data::DecodedArray;
use crate::metadata::{AssociationOutcome, ChannelAttribute, MetadataValue};
use crate::timestamp::Timestamp;
use std::collections::BTreeMap;

/// A decoded frame paired with the metadata valid at its acquisition time.
///
/// Records are immutable once built. The cache and downstream consumers share
/// them behind `Arc`, so caching a record never copies pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    /// Source frame id.
    pub sequence_id: i64,
    /// Frame acquisition time.
    pub timestamp: Timestamp,
    /// `frames_received + frames_missed` when the record was built (1-based).
    pub stream_position: u64,
    /// Decoded, row-major frame data.
    pub array: DecodedArray,
    /// Association result per known channel.
    pub attributes: BTreeMap<String, ChannelAttribute>,
    /// True when any channel was `Failed` or `ChannelMissing`.
    pub degraded: bool,
    /// Derived per-frame arrays handed to the pipeline (e.g. `qx`, `qy`, `qz`).
    pub derived: BTreeMap<String, DecodedArray>,
}

impl SyncRecord {
    /// Attribute for a channel.
    pub fn attribute(&self, channel: &str) -> Option<&ChannelAttribute> {
        self.attributes.get(channel)
    }

    /// Association outcome for a channel.
    pub fn outcome(&self, channel: &str) -> Option<AssociationOutcome> {
        self.attributes.get(channel).map(|a| a.outcome)
    }

    /// Attached value for a channel.
    pub fn value(&self, channel: &str) -> Option<&MetadataValue> {
        self.attributes.get(channel).and_then(|a| a.value.as_ref())
    }

    /// Attached numeric value for a channel.
    pub fn value_f64(&self, channel: &str) -> Option<f64> {
        self.value(channel).and_then(MetadataValue::as_f64)
    }

    /// Every channel was `Matched` or `KeptStale`.
    pub fn is_fully_associated(&self) -> bool {
        self.attributes.values().all(|a| a.outcome.is_usable())
    }
}
