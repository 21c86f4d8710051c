//! Sequence gap detection.
//!
//! Frame ids are meant to increase by one. The detector keeps the highest id
//! seen and reports how many ids were skipped on each call. An id at or below
//! the high-water mark is a sequence anomaly: logged and counted, never an
//! error, and the mark is not rewound.

/// Gap detector over a monotonically intended frame id.
#[derive(Debug, Default, Clone)]
pub struct SequenceGapDetector {
    last: Option<i64>,
    gap_events: u64,
    anomalies: u64,
}

impl SequenceGapDetector {
    /// Create a detector that has seen nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sequence_id` and return how many ids were skipped since the last call.
    ///
    /// Gaps wider than `u32::MAX` saturate.
    pub fn observe(&mut self, sequence_id: i64) -> u32 {
        let Some(last) = self.last else {
            self.last = Some(sequence_id);
            return 0;
        };

        if sequence_id <= last {
            self.anomalies += 1;
            tracing::warn!(
                sequence_id,
                high_water_mark = last,
                "Sequence anomaly: frame id not above last seen"
            );
            return 0;
        }

        self.last = Some(sequence_id);
        let skipped = (i128::from(sequence_id) - i128::from(last) - 1) as u128;
        let gap = u32::try_from(skipped).unwrap_or(u32::MAX);
        if gap > 0 {
            self.gap_events += 1;
            tracing::warn!(sequence_id, previous = last, missed = gap, "Frame gap detected");
        }
        gap
    }

    /// Highest id seen.
    pub fn last_seen(&self) -> Option<i64> {
        self.last
    }

    /// Calls that reported a non-zero gap.
    pub fn gap_events(&self) -> u64 {
        self.gap_events
    }

    /// Calls with an id at or below the high-water mark.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Forget the high-water mark and counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_call_reports_no_gap() {
        let mut detector = SequenceGapDetector::new();
        assert_eq!(detector.observe(1000), 0);
        assert_eq!(detector.last_seen(), Some(1000));
    }

    #[test]
    fn test_gap_counts_skipped_ids() {
        let mut detector = SequenceGapDetector::new();
        detector.observe(1);
        assert_eq!(detector.observe(2), 0);
        assert_eq!(detector.observe(5), 2);
        assert_eq!(detector.gap_events(), 1);
    }

    #[test]
    fn test_out_of_order_does_not_rewind() {
        let mut detector = SequenceGapDetector::new();
        detector.observe(10);
        assert_eq!(detector.observe(7), 0);
        assert_eq!(detector.observe(10), 0);
        assert_eq!(detector.last_seen(), Some(10));
        assert_eq!(detector.anomalies(), 2);
        assert_eq!(detector.observe(11), 0);
    }

    #[test]
    fn test_huge_gap_saturates() {
        let mut detector = SequenceGapDetector::new();
        detector.observe(i64::MIN);
        assert_eq!(detector.observe(i64::MAX), u32::MAX);
    }

    #[test]
    fn test_reset_forgets_high_water_mark() {
        let mut detector = SequenceGapDetector::new();
        detector.observe(50);
        detector.reset();
        assert_eq!(detector.observe(3), 0);
        assert_eq!(detector.last_seen(), Some(3));
        assert_eq!(detector.anomalies(), 0);
    }

    proptest! {
        #[test]
        fn strictly_increasing_ids_sum_to_span(
            first in -1_000_000i64..1_000_000,
            steps in proptest::collection::vec(1i64..50, 1..200),
        ) {
            let mut detector = SequenceGapDetector::new();
            let mut id = first;
            let mut total = u64::from(detector.observe(id));
            for step in &steps {
                id += step;
                total += u64::from(detector.observe(id));
            }
            let calls = steps.len() as i64 + 1;
            prop_assert_eq!(total as i64, id - first - calls + 1);
        }

        #[test]
        fn stale_ids_never_move_the_mark(
            mark in 0i64..10_000,
            stale in proptest::collection::vec(-10_000i64..=0, 1..50),
        ) {
            let mut detector = SequenceGapDetector::new();
            detector.observe(mark);
            for offset in stale {
                prop_assert_eq!(detector.observe(mark + offset), 0);
                prop_assert_eq!(detector.last_seen(), Some(mark));
            }
        }
    }
}
