//! Metadata association.
//!
//! Metadata channels publish on their own schedule. [`MetadataInbox`] gives
//! each known channel a bounded lock-free queue: publishers push from any
//! thread, a full queue drops its oldest value, and pushing never blocks.
//!
//! The frame path owns an [`AssociationEngine`]. For every frame it drains
//! each channel to its freshest value, keeps that value as the channel's
//! "last known" slot, and classifies it against the frame timestamp:
//!
//! | condition                                   | outcome          | value attached |
//! |---------------------------------------------|------------------|----------------|
//! | slot never filled                           | `ChannelMissing` | no             |
//! | value has no timestamp                      | `Matched`        | yes            |
//! | `|frame - (value + offset)| <= tolerance`   | `Matched`        | yes            |
//! | frame later than `value + offset`           | `KeptStale`      | yes            |
//! | frame not later than `value + offset`       | `Failed`         | no             |
//!
//! A `Failed` value stays in the slot; it may match a later frame.

use crossbeam_queue::ArrayQueue;
use daq_core::{
    AssociationOutcome, ChannelAttribute, DaqError, MetadataUpdate, MetadataValue, Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Timestamp tolerance and offset applied to one channel, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPolicy {
    /// Largest accepted `|frame - adjusted value|`.
    pub tolerance: f64,
    /// Added to the value timestamp before comparing.
    pub offset: f64,
}

impl ChannelPolicy {
    /// Policy with the given tolerance and no offset.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            offset: 0.0,
        }
    }
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self::with_tolerance(0.0)
    }
}

/// Classify a value timestamp against a frame timestamp.
pub fn classify(
    frame_timestamp: Timestamp,
    value_timestamp: Option<Timestamp>,
    tolerance: f64,
    offset: f64,
) -> AssociationOutcome {
    let Some(value_timestamp) = value_timestamp else {
        return AssociationOutcome::Matched;
    };
    // frame - (value + offset)
    let delta = frame_timestamp.seconds_since(value_timestamp) - offset;
    if delta.abs() <= tolerance {
        AssociationOutcome::Matched
    } else if delta > 0.0 {
        AssociationOutcome::KeptStale
    } else {
        AssociationOutcome::Failed
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TimedValue {
    value: MetadataValue,
    timestamp: Option<Timestamp>,
}

#[derive(Debug)]
struct ChannelQueue {
    queue: ArrayQueue<TimedValue>,
    pushes: AtomicU64,
    overflow_drops: AtomicU64,
}

/// Push-side counters of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxCounters {
    /// Values accepted.
    pub pushes: u64,
    /// Queued values displaced by a newer push.
    pub overflow_drops: u64,
}

/// Per-channel bounded queues shared between publishers and the frame path.
///
/// The channel table is fixed at construction; only the queues are shared.
#[derive(Debug)]
pub struct MetadataInbox {
    channels: HashMap<String, ChannelQueue>,
    closed: AtomicBool,
}

impl MetadataInbox {
    /// Create one queue of `capacity` values per channel.
    pub fn new<I, S>(channels: I, capacity: usize) -> Result<Self, DaqError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if capacity == 0 {
            return Err(DaqError::Configuration(
                "metadata queue capacity must be > 0".into(),
            ));
        }
        let mut table = HashMap::new();
        for name in channels {
            let name = name.into();
            let queue = ChannelQueue {
                queue: ArrayQueue::new(capacity),
                pushes: AtomicU64::new(0),
                overflow_drops: AtomicU64::new(0),
            };
            if table.insert(name.clone(), queue).is_some() {
                return Err(DaqError::Configuration(format!(
                    "duplicate metadata channel '{name}'"
                )));
            }
        }
        Ok(Self {
            channels: table,
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue an update without blocking.
    ///
    /// Returns `false` for unknown channels and after [`close`](Self::close).
    /// A full queue drops its oldest value to make room.
    pub fn push(&self, update: MetadataUpdate) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let Some(channel) = self.channels.get(&update.channel) else {
            tracing::debug!(channel = %update.channel, "Rejected update for unknown channel");
            return false;
        };
        channel.pushes.fetch_add(1, Ordering::Relaxed);
        let displaced = channel.queue.force_push(TimedValue {
            value: update.value,
            timestamp: update.timestamp,
        });
        if displaced.is_some() {
            channel.overflow_drops.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(channel = %update.channel, "Metadata queue full, dropped oldest value");
        }
        true
    }

    /// Refuse further pushes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Accept pushes again.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Whether pushes are refused.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether `channel` is in the table.
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Number of values waiting on a channel.
    pub fn pending(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |c| c.queue.len())
    }

    /// Push-side counters for a channel.
    pub fn counters(&self, channel: &str) -> Option<InboxCounters> {
        self.channels.get(channel).map(|c| InboxCounters {
            pushes: c.pushes.load(Ordering::Relaxed),
            overflow_drops: c.overflow_drops.load(Ordering::Relaxed),
        })
    }

    /// Zero the push-side counters.
    pub fn reset_counters(&self) {
        for channel in self.channels.values() {
            channel.pushes.store(0, Ordering::Relaxed);
            channel.overflow_drops.store(0, Ordering::Relaxed);
        }
    }

    /// Pop everything queued on a channel and return the last value popped.
    fn drain_latest(&self, channel: &str) -> Option<TimedValue> {
        let queue = &self.channels.get(channel)?.queue;
        let mut latest = None;
        while let Some(value) = queue.pop() {
            latest = Some(value);
        }
        latest
    }

    fn clear(&self) {
        for name in self.channels.keys() {
            let _ = self.drain_latest(name);
        }
    }
}

#[derive(Debug)]
struct ChannelState {
    name: String,
    policy: ChannelPolicy,
    last_known: Option<TimedValue>,
}

/// Association of one frame across every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAssociation {
    /// Attribute per channel.
    pub attributes: BTreeMap<String, ChannelAttribute>,
    /// Some channel was `Failed` or `ChannelMissing`.
    pub degraded: bool,
}

/// Frame-side association state: one "last known" slot per channel.
#[derive(Debug)]
pub struct AssociationEngine {
    inbox: Arc<MetadataInbox>,
    channels: Vec<ChannelState>,
}

impl AssociationEngine {
    /// Build an engine over `(channel, policy)` pairs with queues of `queue_capacity`.
    pub fn new(
        channels: Vec<(String, ChannelPolicy)>,
        queue_capacity: usize,
    ) -> Result<Self, DaqError> {
        for (name, policy) in &channels {
            if !policy.tolerance.is_finite() || policy.tolerance < 0.0 {
                return Err(DaqError::Configuration(format!(
                    "channel '{name}' tolerance must be a finite, non-negative number of seconds"
                )));
            }
            if !policy.offset.is_finite() {
                return Err(DaqError::Configuration(format!(
                    "channel '{name}' offset must be finite"
                )));
            }
        }
        let inbox = MetadataInbox::new(channels.iter().map(|(n, _)| n.clone()), queue_capacity)?;
        Ok(Self {
            inbox: Arc::new(inbox),
            channels: channels
                .into_iter()
                .map(|(name, policy)| ChannelState {
                    name,
                    policy,
                    last_known: None,
                })
                .collect(),
        })
    }

    /// Shared inbox for publishers.
    pub fn inbox(&self) -> Arc<MetadataInbox> {
        Arc::clone(&self.inbox)
    }

    /// Channel names in configuration order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Associate one channel with a frame using explicit policy values.
    ///
    /// Returns `None` for a channel outside the table.
    pub fn associate(
        &mut self,
        channel: &str,
        frame_timestamp: Timestamp,
        tolerance: f64,
        offset: f64,
    ) -> Option<ChannelAttribute> {
        let inbox = &self.inbox;
        let state = self.channels.iter_mut().find(|c| c.name == channel)?;
        Some(associate_slot(inbox, state, frame_timestamp, tolerance, offset))
    }

    /// Associate every channel with a frame using the configured policies.
    pub fn associate_all(&mut self, frame_timestamp: Timestamp) -> FrameAssociation {
        let mut attributes = BTreeMap::new();
        let mut degraded = false;
        for state in &mut self.channels {
            let ChannelPolicy { tolerance, offset } = state.policy;
            let attribute = associate_slot(&self.inbox, state, frame_timestamp, tolerance, offset);
            degraded |= !attribute.outcome.is_usable();
            attributes.insert(state.name.clone(), attribute);
        }
        FrameAssociation {
            attributes,
            degraded,
        }
    }

    /// Forget every last-known value and everything still queued.
    pub fn clear_slots(&mut self) {
        self.inbox.clear();
        for state in &mut self.channels {
            state.last_known = None;
        }
    }
}

fn associate_slot(
    inbox: &MetadataInbox,
    state: &mut ChannelState,
    frame_timestamp: Timestamp,
    tolerance: f64,
    offset: f64,
) -> ChannelAttribute {
    if let Some(latest) = inbox.drain_latest(&state.name) {
        state.last_known = Some(latest);
    }
    let Some(known) = &state.last_known else {
        return ChannelAttribute::empty(AssociationOutcome::ChannelMissing);
    };

    let outcome = classify(frame_timestamp, known.timestamp, tolerance, offset);
    tracing::trace!(channel = %state.name, outcome = outcome.as_str(), "Associated channel");
    if outcome.is_usable() {
        ChannelAttribute {
            outcome,
            value: Some(known.value.clone()),
            value_timestamp: known.timestamp,
        }
    } else {
        ChannelAttribute::empty(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 0.001;

    fn engine(capacity: usize) -> AssociationEngine {
        AssociationEngine::new(
            vec![("x".to_string(), ChannelPolicy::with_tolerance(TOL))],
            capacity,
        )
        .unwrap()
    }

    fn at(seconds: f64) -> Timestamp {
        Timestamp::from_secs_f64(seconds)
    }

    #[test]
    fn test_classify_boundaries() {
        let frame = at(10.0);
        assert_eq!(classify(frame, Some(at(10.0005)), TOL, 0.0), AssociationOutcome::Matched);
        assert_eq!(classify(frame, Some(at(9.5)), TOL, 0.0), AssociationOutcome::KeptStale);
        assert_eq!(classify(frame, Some(at(10.5)), TOL, 0.0), AssociationOutcome::Failed);
        assert_eq!(classify(frame, None, TOL, 0.0), AssociationOutcome::Matched);
        // Offset shifts the value timestamp before comparing.
        assert_eq!(classify(frame, Some(at(9.5)), TOL, 0.5), AssociationOutcome::Matched);
    }

    #[test]
    fn test_missing_until_first_value() {
        let mut engine = engine(8);
        let attribute = engine.associate("x", at(1.0), TOL, 0.0).unwrap();
        assert_eq!(attribute.outcome, AssociationOutcome::ChannelMissing);
        assert!(attribute.value.is_none());
    }

    #[test]
    fn test_matched_then_kept_stale_with_same_value() {
        let mut engine = engine(8);
        let inbox = engine.inbox();
        assert!(inbox.push(MetadataUpdate::new("x", 4.2).at(1.0)));

        let matched = engine.associate("x", at(1.0), TOL, 0.0).unwrap();
        assert_eq!(matched.outcome, AssociationOutcome::Matched);

        let stale = engine.associate("x", at(1.0 + 2.0 * TOL), TOL, 0.0).unwrap();
        assert_eq!(stale.outcome, AssociationOutcome::KeptStale);
        assert_eq!(stale.value, matched.value);
    }

    #[test]
    fn test_failed_keeps_value_in_slot() {
        let mut engine = engine(8);
        engine.inbox().push(MetadataUpdate::new("x", 1.0).at(5.0));

        let failed = engine.associate("x", at(4.0), TOL, 0.0).unwrap();
        assert_eq!(failed.outcome, AssociationOutcome::Failed);
        assert!(failed.value.is_none());

        // The retained value matches a later frame.
        let matched = engine.associate("x", at(5.0), TOL, 0.0).unwrap();
        assert_eq!(matched.outcome, AssociationOutcome::Matched);
        assert_eq!(matched.value, Some(MetadataValue::Number(1.0)));
    }

    #[test]
    fn test_drains_to_freshest_dequeued() {
        let mut engine = engine(8);
        let inbox = engine.inbox();
        for (i, t) in [1.0, 3.0, 2.0].into_iter().enumerate() {
            inbox.push(MetadataUpdate::new("x", i as f64).at(t));
        }
        let attribute = engine.associate("x", at(2.0), TOL, 0.0).unwrap();
        // Last dequeued wins, even though it is not the newest timestamp.
        assert_eq!(attribute.value, Some(MetadataValue::Number(2.0)));
        assert_eq!(inbox.pending("x"), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let engine = engine(2);
        let inbox = engine.inbox();
        for i in 0..5 {
            assert!(inbox.push(MetadataUpdate::new("x", f64::from(i))));
        }
        assert_eq!(inbox.pending("x"), 2);
        assert_eq!(
            inbox.counters("x"),
            Some(InboxCounters {
                pushes: 5,
                overflow_drops: 3
            })
        );
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let mut engine = engine(8);
        assert!(!engine.inbox().push(MetadataUpdate::new("y", 1.0)));
        assert!(engine.associate("y", at(0.0), TOL, 0.0).is_none());
    }

    #[test]
    fn test_closed_inbox_rejects() {
        let engine = engine(8);
        let inbox = engine.inbox();
        inbox.close();
        assert!(!inbox.push(MetadataUpdate::new("x", 1.0)));
        inbox.reopen();
        assert!(inbox.push(MetadataUpdate::new("x", 1.0)));
    }

    #[test]
    fn test_associate_all_flags_degraded() {
        let mut engine = AssociationEngine::new(
            vec![
                ("x".to_string(), ChannelPolicy::with_tolerance(TOL)),
                ("energy".to_string(), ChannelPolicy::with_tolerance(TOL)),
            ],
            4,
        )
        .unwrap();
        engine.inbox().push(MetadataUpdate::new("x", 1.0).at(1.0));

        let association = engine.associate_all(at(1.0));
        assert!(association.degraded);
        assert_eq!(
            association.attributes["energy"].outcome,
            AssociationOutcome::ChannelMissing
        );

        engine.inbox().push(MetadataUpdate::new("energy", "12keV"));
        let association = engine.associate_all(at(1.0005));
        assert!(!association.degraded);
    }

    #[test]
    fn test_clear_slots_forgets_values() {
        let mut engine = engine(8);
        let inbox = engine.inbox();
        inbox.push(MetadataUpdate::new("x", 1.0));
        engine.associate("x", at(0.0), TOL, 0.0);
        inbox.push(MetadataUpdate::new("x", 2.0));

        engine.clear_slots();
        assert_eq!(inbox.pending("x"), 0);
        let attribute = engine.associate("x", at(0.0), TOL, 0.0).unwrap();
        assert_eq!(attribute.outcome, AssociationOutcome::ChannelMissing);
    }

    #[test]
    fn test_construction_validation() {
        assert!(AssociationEngine::new(vec![("x".into(), ChannelPolicy::default())], 0).is_err());
        assert!(AssociationEngine::new(
            vec![
                ("x".into(), ChannelPolicy::default()),
                ("x".into(), ChannelPolicy::default())
            ],
            4
        )
        .is_err());
        assert!(AssociationEngine::new(
            vec![("x".into(), ChannelPolicy::with_tolerance(-1.0))],
            4
        )
        .is_err());
    }
}
