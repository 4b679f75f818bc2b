//! # cord-heart
//!
//! A general purpose pacemaker: a periodic heartbeat loop that detects a
//! missing acknowledgement and reports death asynchronously, while staying
//! cleanly stoppable from the outside.

mod clock;
mod pacemaker;

pub use clock::AtomicClock;
pub use pacemaker::{Death, HeartError, Pacemaker, Pulse};
