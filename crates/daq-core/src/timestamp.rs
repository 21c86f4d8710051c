//! Acquisition timestamps.
//!
//! Detector and channel timestamps arrive as seconds past an epoch plus a
//! nanosecond fraction. [`Timestamp`] keeps both parts so ordering and
//! equality are exact, and converts to `f64` seconds for tolerance math.

use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Seconds plus sub-second nanoseconds. `nanos` is always `< 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, carrying excess nanoseconds into seconds.
    pub fn new(secs: i64, nanos: u32) -> Self {
        let carry = i64::from(nanos) / NANOS_PER_SEC;
        Self {
            secs: secs.saturating_add(carry),
            nanos: (i64::from(nanos) % NANOS_PER_SEC) as u32,
        }
    }

    /// Build a timestamp from floating-point seconds.
    ///
    /// Non-finite input maps to the zero timestamp.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() {
            return Self::default();
        }
        let secs = seconds.floor();
        let mut nanos = ((seconds - secs) * NANOS_PER_SEC as f64).round() as i64;
        let mut secs = secs as i64;
        if nanos >= NANOS_PER_SEC {
            secs = secs.saturating_add(1);
            nanos -= NANOS_PER_SEC;
        }
        Self {
            secs,
            nanos: nanos as u32,
        }
    }

    /// Whole seconds.
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Sub-second part in nanoseconds.
    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Seconds as `f64`.
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) / NANOS_PER_SEC as f64
    }

    /// Signed seconds from `earlier` to `self`.
    ///
    /// Whole seconds and nanoseconds are subtracted separately, so epoch-sized
    /// timestamps keep sub-microsecond precision.
    pub fn seconds_since(&self, earlier: Timestamp) -> f64 {
        let secs = self.secs.saturating_sub(earlier.secs) as f64;
        let nanos = i64::from(self.nanos) - i64::from(earlier.nanos);
        secs + nanos as f64 / NANOS_PER_SEC as f64
    }
}

impl From<f64> for Timestamp {
    fn from(seconds: f64) -> Self {
        Self::from_secs_f64(seconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_nanos() {
        let ts = Timestamp::new(10, 1_500_000_000);
        assert_eq!(ts.secs(), 11);
        assert_eq!(ts.subsec_nanos(), 500_000_000);
    }

    #[test]
    fn test_from_secs_f64() {
        let ts = Timestamp::from_secs_f64(12.25);
        assert_eq!(ts.secs(), 12);
        assert_eq!(ts.subsec_nanos(), 250_000_000);
        assert!((ts.as_secs_f64() - 12.25).abs() < 1e-9);
    }

    #[test]
    fn test_negative_seconds() {
        let ts = Timestamp::from_secs_f64(-0.5);
        assert_eq!(ts.secs(), -1);
        assert_eq!(ts.subsec_nanos(), 500_000_000);
        assert!((ts.as_secs_f64() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp::new(1, 999_999_999) < Timestamp::new(2, 0));
        assert_eq!(Timestamp::from_secs_f64(f64::NAN), Timestamp::default());
    }

    #[test]
    fn test_seconds_since_keeps_precision_at_epoch_scale() {
        let earlier = Timestamp::new(1_700_000_000, 999_999_000);
        let later = Timestamp::new(1_700_000_001, 500);
        assert!((later.seconds_since(earlier) - 1.5e-6).abs() < 1e-12);
        assert!((earlier.seconds_since(later) + 1.5e-6).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new(3, 42).to_string(), "3.000000042");
    }
}
