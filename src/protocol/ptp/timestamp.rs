//! Clock time representation and normalization.
//!
//! Both PTP generations carry timestamps as a seconds/nanoseconds pair,
//! but the legacy format uses a *signed* nanoseconds field and offset
//! arithmetic routinely produces out-of-range intermediate values. A
//! [`ClockTime`] therefore stores both components as signed integers and
//! is only brought into canonical form by [`ClockTime::normalize`].

use std::time::Duration;

/// A seconds/nanoseconds pair.
///
/// Not necessarily normalized: intermediate results may carry nanoseconds
/// outside `0..1_000_000_000`. Anything handed to an observer goes through
/// [`ClockTime::normalize`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockTime {
    /// Whole seconds (may be negative).
    pub seconds: i64,
    /// Nanoseconds (canonical range is `0..NANOS_PER_SEC`).
    pub nanoseconds: i64,
}

impl ClockTime {
    /// Nanoseconds in one second.
    pub const NANOS_PER_SEC: i64 = 1_000_000_000;

    /// Zero time.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a time from raw components, without normalizing.
    #[must_use]
    pub const fn new(seconds: i64, nanoseconds: i64) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Normalize a raw pair so that `0 <= nanoseconds < 1_000_000_000`.
    ///
    /// Carries and borrows of any size are folded into the seconds
    /// component, so the instant `seconds * 1e9 + nanoseconds` is preserved.
    #[must_use]
    pub const fn normalize(seconds: i64, nanoseconds: i64) -> Self {
        let carry = nanoseconds.div_euclid(Self::NANOS_PER_SEC);
        Self {
            seconds: seconds.saturating_add(carry),
            nanoseconds: nanoseconds.rem_euclid(Self::NANOS_PER_SEC),
        }
    }

    /// Normalized copy of `self`. Idempotent.
    #[must_use]
    pub const fn normalized(self) -> Self {
        Self::normalize(self.seconds, self.nanoseconds)
    }

    /// Whether the nanoseconds component is already in canonical range.
    #[must_use]
    pub const fn is_normalized(&self) -> bool {
        self.nanoseconds >= 0 && self.nanoseconds < Self::NANOS_PER_SEC
    }

    /// Add a delta component-wise and normalize the result.
    #[must_use]
    pub const fn apply_delta(self, delta_seconds: i64, delta_nanoseconds: i64) -> Self {
        Self::normalize(
            self.seconds.saturating_add(delta_seconds),
            self.nanoseconds.saturating_add(delta_nanoseconds),
        )
    }

    /// Total nanoseconds, using full precision.
    #[must_use]
    pub fn to_nanos(&self) -> i128 {
        i128::from(self.seconds) * i128::from(Self::NANOS_PER_SEC) + i128::from(self.nanoseconds)
    }

    /// Build a normalized time from a total nanosecond count.
    ///
    /// Values outside the `i64` seconds range saturate.
    #[must_use]
    pub fn from_nanos(nanos: i128) -> Self {
        let per_sec = i128::from(Self::NANOS_PER_SEC);
        let seconds = nanos.div_euclid(per_sec);
        let seconds = i64::try_from(seconds).unwrap_or(if seconds < 0 { i64::MIN } else { i64::MAX });
        #[allow(
            clippy::cast_possible_truncation,
            reason = "rem_euclid by 1e9 always fits in i64"
        )]
        let nanoseconds = nanos.rem_euclid(per_sec) as i64;
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Total milliseconds (floor), as used for "last sync at" reporting.
    #[must_use]
    pub fn to_millis(&self) -> i64 {
        let millis = self.to_nanos().div_euclid(1_000_000);
        i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX })
    }

    /// Signed difference in nanoseconds: `self - other`.
    #[must_use]
    pub fn diff_nanos(&self, other: &Self) -> i128 {
        self.to_nanos() - other.to_nanos()
    }

    /// Create from a `Duration` (e.g. time since the Unix epoch).
    #[must_use]
    pub fn from_duration(d: Duration) -> Self {
        Self {
            seconds: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nanoseconds: i64::from(d.subsec_nanos()),
        }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.normalized();
        write!(f, "{}.{:09}", n.seconds, n.nanoseconds)
    }
}

impl std::ops::Sub for ClockTime {
    type Output = i128;

    fn sub(self, rhs: Self) -> Self::Output {
        self.diff_nanos(&rhs)
    }
}

impl From<Duration> for ClockTime {
    fn from(d: Duration) -> Self {
        Self::from_duration(d)
    }
}
