//! Simulated time.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize};

/// A point in simulated time, in seconds from an arbitrary epoch.
///
/// Ordered with `f64::total_cmp`, so instants sort and binary-search without
/// any `partial_cmp` unwrapping. Non-finite instants can be constructed but
/// are rejected by [`Segment::append`](crate::Segment::append).
///
/// `-0.0` is stored as `+0.0`; `total_cmp` would otherwise order the two.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Instant(f64);

impl Instant {
    /// The origin of the time scale.
    pub const EPOCH: Instant = Instant(0.0);

    pub const fn from_secs(secs: f64) -> Self {
        Self(secs + 0.0)
    }

    /// Seconds since [`Instant::EPOCH`].
    pub const fn secs(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Instant {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Instant {}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Shift by a duration in seconds.
impl Add<f64> for Instant {
    type Output = Instant;

    fn add(self, seconds: f64) -> Instant {
        Instant::from_secs(self.0 + seconds)
    }
}

impl Sub<f64> for Instant {
    type Output = Instant;

    fn sub(self, seconds: f64) -> Instant {
        Instant::from_secs(self.0 - seconds)
    }
}

/// Elapsed seconds between two instants.
impl Sub<Instant> for Instant {
    type Output = f64;

    fn sub(self, other: Instant) -> f64 {
        self.0 - other.0
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Instant::from_secs)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        let a = Instant::from_secs(1.0);
        let b = Instant::from_secs(2.5);
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert_eq!(Instant::from_secs(f64::NAN).cmp(&b), Ordering::Greater);
    }

    #[test]
    fn test_arithmetic() {
        let t0 = Instant::EPOCH;
        let t1 = t0 + 3.0;
        assert_eq!(t1.secs(), 3.0);
        assert_eq!(t1 - t0, 3.0);
        assert_eq!(t1 - 1.0, Instant::from_secs(2.0));
    }

    #[test]
    fn test_signed_zero_is_one_instant() {
        let negative = Instant::from_secs(-0.0);
        assert_eq!(negative, Instant::EPOCH);
        assert_eq!(negative.cmp(&Instant::EPOCH), Ordering::Equal);
        assert!(negative.secs().is_sign_positive());
        assert_eq!(Instant::from_secs(1.0) - 1.0, Instant::EPOCH);
        assert!((Instant::from_secs(-1.0) + 1.0).secs().is_sign_positive());

        let back: Instant = serde_json::from_str("-0.0").unwrap();
        assert_eq!(back, Instant::EPOCH);
        assert_eq!(serde_json::to_string(&back).unwrap(), "0.0");
    }

    #[test]
    fn test_display() {
        assert_eq!(Instant::from_secs(1.5).to_string(), "1.5 s");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Instant::from_secs(4.25)).unwrap();
        assert_eq!(json, "4.25");
        let back: Instant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Instant::from_secs(4.25));
    }
}
