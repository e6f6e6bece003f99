//! Local clock and offset correction.
//!
//! The follower never steps the host clock. Instead it keeps an
//! accumulated offset and subtracts it from a monotonic, epoch-anchored
//! time source whenever the corrected time is read.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::timestamp::ClockTime;

/// A monotonic, high-resolution source of raw (uncorrected) time.
pub trait TimeSource: Send + Sync {
    /// Current raw time.
    fn now(&self) -> ClockTime;
}

/// Wall-clock anchored monotonic time source.
///
/// Captures the system time once at construction and advances it with
/// [`Instant`], so host clock steps never make readings go backwards.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    anchor_wall: ClockTime,
    anchor: Instant,
}

impl SystemTimeSource {
    /// Create a source anchored at the current system time.
    #[must_use]
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self {
            anchor_wall: ClockTime::from_duration(since_epoch),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> ClockTime {
        let elapsed = ClockTime::from_duration(self.anchor.elapsed());
        self.anchor_wall
            .apply_delta(elapsed.seconds, elapsed.nanoseconds)
    }
}

/// Manually driven time source, for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<Mutex<ClockTime>>,
}

impl ManualTimeSource {
    /// Create a source frozen at `start`.
    #[must_use]
    pub fn new(start: ClockTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start.normalized())),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: ClockTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time.normalized();
    }

    /// Move forward by `d`.
    pub fn advance(&self, d: Duration) {
        let step = ClockTime::from_duration(d);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.apply_delta(step.seconds, step.nanoseconds);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> ClockTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Corrected local clock: raw time source minus the accumulated offset.
#[derive(Clone)]
pub struct LocalClock {
    source: Arc<dyn TimeSource>,
    offset: ClockTime,
}

impl LocalClock {
    /// Create a clock with zero offset over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            offset: ClockTime::ZERO,
        }
    }

    /// Create a clock over the system time source.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource::new()))
    }

    /// Corrected time, normalized.
    #[must_use]
    pub fn now(&self) -> ClockTime {
        let raw = self.source.now();
        ClockTime::normalize(
            raw.seconds.saturating_sub(self.offset.seconds),
            raw.nanoseconds.saturating_sub(self.offset.nanoseconds),
        )
    }

    /// Corrected time as a single nanosecond count.
    #[must_use]
    pub fn now_nanos(&self) -> i128 {
        self.now().to_nanos()
    }

    /// Fold a measured delta into the offset.
    pub fn apply_delta(&mut self, delta_seconds: i64, delta_nanoseconds: i64) {
        self.offset = self.offset.apply_delta(delta_seconds, delta_nanoseconds);
    }

    /// The accumulated offset (always normalized).
    #[must_use]
    pub fn offset(&self) -> ClockTime {
        self.offset
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Debug for LocalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClock")
            .field("offset", &format_args!("{}", self.offset))
            .finish_non_exhaustive()
    }
}
