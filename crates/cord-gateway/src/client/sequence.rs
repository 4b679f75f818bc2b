//! Dispatch sequence tracking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the last sequence number observed on dispatch frames.
///
/// Zero means none observed; real sequence numbers start at 1. Written only
/// by the event loop, read by the handshake and the pacemaker.
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    /// A tracker that has seen nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Record a sequence number from a dispatch frame.
    pub fn set(&self, seq: u64) {
        self.0.store(seq, Ordering::SeqCst);
    }

    /// The last observed sequence number, if any.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Forget everything; the next session starts fresh.
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unset() {
        assert_eq!(Sequence::new().get(), None);
    }

    #[test]
    fn test_set_and_get() {
        let seq = Sequence::new();
        seq.set(7);
        assert_eq!(seq.get(), Some(7));
        seq.set(8);
        assert_eq!(seq.get(), Some(8));
    }

    #[test]
    fn test_reset() {
        let seq = Sequence::new();
        seq.set(42);
        seq.reset();
        assert_eq!(seq.get(), None);
    }
}
