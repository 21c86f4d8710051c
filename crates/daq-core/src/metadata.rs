//! Metadata channel values and association outcomes.
//!
//! Channel values are a tagged union rather than loosely typed maps: numeric
//! channels are canonicalised to `f64`, anything else is kept as text.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value published by a metadata channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Numeric scalar in canonical floating-point form.
    Number(f64),
    /// Non-numeric value (enum labels, names).
    Text(String),
}

impl MetadataValue {
    /// Numeric reading. Text is parsed when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(v) => Some(*v),
            MetadataValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Boolean reading used by gating channels.
    ///
    /// Numbers are true when non-zero. Text accepts `true/false`, `yes/no`,
    /// `on/off` and numeric strings, case-insensitively.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Number(v) if v.is_nan() => None,
            MetadataValue::Number(v) => Some(*v != 0.0),
            MetadataValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                other => other
                    .parse::<f64>()
                    .ok()
                    .filter(|v| !v.is_nan())
                    .map(|v| v != 0.0),
            },
        }
    }

    /// Text view, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Number(_) => None,
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Number(if v { 1.0 } else { 0.0 })
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(v) => write!(f, "{v}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

/// One inbound metadata notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    /// Channel name as registered with the engine.
    pub channel: String,
    /// Published value.
    pub value: MetadataValue,
    /// Source timestamp. Untimestamped values are always treated as current.
    pub timestamp: Option<Timestamp>,
}

impl MetadataUpdate {
    /// Untimestamped update.
    pub fn new(channel: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self {
            channel: channel.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    /// Set the source timestamp.
    pub fn at(mut self, timestamp: impl Into<Timestamp>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// How a channel was paired with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationOutcome {
    /// Value timestamp within tolerance of the frame.
    Matched,
    /// No fresh value, but the last known one predates the frame; still attached.
    KeptStale,
    /// Newest value is newer than the frame; nothing attached.
    Failed,
    /// No value has ever arrived on this channel.
    ChannelMissing,
}

impl AssociationOutcome {
    /// Whether a value was attached to the frame.
    pub fn is_usable(self) -> bool {
        matches!(self, AssociationOutcome::Matched | AssociationOutcome::KeptStale)
    }

    /// Short label for logs and statistics.
    pub const fn as_str(self) -> &'static str {
        match self {
            AssociationOutcome::Matched => "matched",
            AssociationOutcome::KeptStale => "kept_stale",
            AssociationOutcome::Failed => "failed",
            AssociationOutcome::ChannelMissing => "channel_missing",
        }
    }
}

impl fmt::Display for AssociationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel attribute attached to a synchronized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAttribute {
    /// Association outcome for this channel.
    pub outcome: AssociationOutcome,
    /// Attached value (`None` for `Failed` and `ChannelMissing`).
    pub value: Option<MetadataValue>,
    /// Source timestamp of the attached value.
    pub value_timestamp: Option<Timestamp>,
}

impl ChannelAttribute {
    /// Attribute carrying no value.
    pub fn empty(outcome: AssociationOutcome) -> Self {
        Self {
            outcome,
            value: None,
            value_timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_readings() {
        assert_eq!(MetadataValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(MetadataValue::from(" 7 ").as_f64(), Some(7.0));
        assert_eq!(MetadataValue::from("theta").as_f64(), None);
    }

    #[test]
    fn test_boolean_readings() {
        assert_eq!(MetadataValue::from(true).as_bool(), Some(true));
        assert_eq!(MetadataValue::from(0.0).as_bool(), Some(false));
        assert_eq!(MetadataValue::from("On").as_bool(), Some(true));
        assert_eq!(MetadataValue::from("false").as_bool(), Some(false));
        assert_eq!(MetadataValue::from("2").as_bool(), Some(true));
        assert_eq!(MetadataValue::from("maybe").as_bool(), None);
        assert_eq!(MetadataValue::Number(f64::NAN).as_bool(), None);
    }

    #[test]
    fn test_update_builder() {
        let update = MetadataUpdate::new("energy", 12.4).at(3.0);
        assert_eq!(update.channel, "energy");
        assert_eq!(update.timestamp, Some(Timestamp::from_secs_f64(3.0)));
    }

    #[test]
    fn test_outcome_usability() {
        assert!(AssociationOutcome::Matched.is_usable());
        assert!(AssociationOutcome::KeptStale.is_usable());
        assert!(!AssociationOutcome::Failed.is_usable());
        assert!(!AssociationOutcome::ChannelMissing.is_usable());
    }

    #[test]
    fn test_untagged_serialization() {
        let json = serde_json::to_string(&MetadataValue::from(1.5)).unwrap();
        assert_eq!(json, "1.5");
        let value: MetadataValue = serde_json::from_str("\"idle\"").unwrap();
        assert_eq!(value, MetadataValue::Text("idle".into()));
    }
}
