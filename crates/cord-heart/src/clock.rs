//! Atomic timestamp cell shared between the pacemaker loop and its observers.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A thread-safe nanosecond Unix timestamp.
///
/// The zero value means "never set". A single 64-bit atomic is enough here;
/// the writer and readers live on different tasks but never need a full lock
/// for one word.
#[derive(Debug, Default)]
pub struct AtomicClock {
    unix_nanos: AtomicI64,
}

impl AtomicClock {
    /// Create a clock that has never been set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            unix_nanos: AtomicI64::new(0),
        }
    }

    /// Store the current wall-clock time.
    pub fn set_now(&self) {
        self.store(now_nanos());
    }

    /// Store an explicit nanosecond timestamp.
    pub fn store(&self, nanos: i64) {
        self.unix_nanos.store(nanos, Ordering::SeqCst);
    }

    /// Load the stored nanosecond timestamp; 0 if never set.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.unix_nanos.load(Ordering::SeqCst)
    }
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
pub(crate) fn now_nanos() -> i64 {
    // Out of range only past the year 2262.
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unset() {
        let clock = AtomicClock::new();
        assert_eq!(clock.get(), 0);
    }

    #[test]
    fn test_store_and_get() {
        let clock = AtomicClock::new();
        clock.store(1_234_567_890);
        assert_eq!(clock.get(), 1_234_567_890);
    }

    #[test]
    fn test_set_now_is_recent() {
        let clock = AtomicClock::new();
        let before = now_nanos();
        clock.set_now();
        let after = now_nanos();

        assert!(clock.get() >= before);
        assert!(clock.get() <= after);
    }
}
