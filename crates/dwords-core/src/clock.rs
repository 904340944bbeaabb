//! Version clocks
//!
//! Every mutation stamps the touched record with a [`Version`] taken from a
//! [`VersionClock`]. Versions order local writes and decide last-writer-wins
//! merges during sync, so a clock must never hand out a value at or below one
//! it has already issued or observed.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Monotonic 64-bit version stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub i64);

impl Version {
    pub const ZERO: Version = Version(0);

    /// Highest stamp a stored or remote record may carry. Keeps clocks
    /// that observe it far from `i64::MAX`.
    pub const MAX: Version = Version(i64::MAX / 2);

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(v: i64) -> Self {
        Version(v)
    }
}

/// Source of version stamps.
pub trait VersionClock: Send + Sync {
    /// Issue a stamp greater than every stamp issued or observed so far.
    fn next(&self) -> Version;

    /// Absorb a stamp seen on stored or remote data.
    fn observe(&self, seen: Version);
}

/// Wall-clock stamps in Unix milliseconds, bumped past the last issued
/// value whenever the system clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct WallClock {
    last: AtomicI64,
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionClock for WallClock {
    fn next(&self) -> Version {
        let now = Utc::now().timestamp_millis();
        let step = |last: i64| now.max(last.saturating_add(1));
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
            .unwrap_or_else(|last| last);
        Version(step(prev))
    }

    fn observe(&self, seen: Version) {
        self.last.fetch_max(seen.0, Ordering::SeqCst);
    }
}

/// Strictly increasing counter starting after zero.
#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicI64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after `start`.
    pub fn starting_at(start: i64) -> Self {
        Self {
            counter: AtomicI64::new(start),
        }
    }
}

impl VersionClock for LogicalClock {
    fn next(&self) -> Version {
        let prev = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .unwrap_or_else(|n| n);
        Version(prev.saturating_add(1))
    }

    fn observe(&self, seen: Version) {
        self.counter.fetch_max(seen.0, Ordering::SeqCst);
    }
}
