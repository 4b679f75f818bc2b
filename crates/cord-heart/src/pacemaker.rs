//! The heartbeat loop.

use crate::clock::AtomicClock;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Errors that terminate the pacemaker loop.
#[derive(Debug, Error)]
pub enum HeartError {
    /// Two heartbeat intervals passed without an acknowledgement.
    #[error("no heartbeat acknowledgement received")]
    Dead,

    /// The pulse failed to emit a heartbeat.
    #[error("failed to emit heartbeat: {0}")]
    Pulse(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Emits a single heartbeat frame. A returned error is fatal to the
/// pacemaker.
#[async_trait]
pub trait Pulse: Send + Sync + 'static {
    async fn beat(&self) -> Result<(), HeartError>;
}

/// One-shot channel carrying the pacemaker's terminal result.
///
/// `Ok(())` is a clean stop; `Err` is fatal. Exactly one value is published
/// per pacemaker lifetime, and the send never blocks even when nobody is
/// listening anymore.
pub type Death = oneshot::Receiver<Result<(), HeartError>>;

/// Periodic heartbeat driver with a liveness check and graceful stop.
///
/// Created fresh for every gateway session; a pacemaker is never restarted.
pub struct Pacemaker {
    heartrate: Duration,
    sent_at: AtomicClock,
    echo_at: AtomicClock,
    // Close-once stop signal: dropping the sender wakes the loop.
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl Pacemaker {
    /// Create a pacemaker beating at `heartrate`. Does nothing until
    /// [`start`](Self::start) is called.
    #[must_use]
    pub fn new(heartrate: Duration) -> Arc<Self> {
        Arc::new(Self {
            heartrate,
            sent_at: AtomicClock::new(),
            echo_at: AtomicClock::new(),
            stop: Mutex::new(None),
        })
    }

    /// The interval between heartbeats.
    #[must_use]
    pub fn heartrate(&self) -> Duration {
        self.heartrate
    }

    /// Record a heartbeat acknowledgement.
    pub fn echo(&self) {
        self.echo_at.set_now();
    }

    /// Liveness check: true when the last emitted heartbeat is more than two
    /// intervals ahead of the last acknowledgement. One missed ack is
    /// tolerated; a second is conclusive.
    #[must_use]
    pub fn dead(&self) -> bool {
        let sent = self.sent_at.get();
        let echo = self.echo_at.get();

        if sent == 0 || echo == 0 {
            return false;
        }

        sent - echo > 2 * self.heartrate.as_nanos() as i64
    }

    /// Request a graceful shutdown of the loop.
    ///
    /// Idempotent and non-blocking, safe even if the loop already exited.
    pub fn stop(&self) {
        let closed = match self.stop.lock() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        };
        if closed {
            tracing::debug!("pacemaker stop signal closed");
        }
    }

    /// Begin the loop on a background task.
    ///
    /// Returns the task handle and the death channel. Must be called at most
    /// once per instance.
    pub fn start<P: Pulse>(self: &Arc<Self>, pulse: P) -> (JoinHandle<()>, Death) {
        let (death_tx, death_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        if let Ok(mut slot) = self.stop.lock() {
            *slot = Some(stop_tx);
        }

        let pacer = Arc::clone(self);
        let task = tokio::spawn(async move {
            let verdict = pacer.run(&pulse, stop_rx).await;
            tracing::debug!(clean = verdict.is_ok(), "pacemaker returned");
            // The receiver may already be gone; that is fine.
            let _ = death_tx.send(verdict);
        });

        (task, death_rx)
    }

    async fn run<P: Pulse>(
        &self,
        pulse: &P,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<(), HeartError> {
        tracing::debug!(heartrate_ms = self.heartrate.as_millis() as u64, "pacemaker started");

        // Seed the ack timestamp so the first liveness comparison is
        // well-defined.
        self.echo_at.set_now();

        let mut ticker = interval(self.heartrate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the loop paces itself.
        ticker.tick().await;

        loop {
            pulse.beat().await?;
            self.sent_at.set_now();

            if self.dead() {
                return Err(HeartError::Dead);
            }

            tokio::select! {
                // Resolves on an explicit stop or when the sender is dropped.
                _ = &mut stop => {
                    tracing::debug!("pacemaker received stop signal");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    tracing::trace!("pacemaker tick");
                }
            }
        }
    }
}

impl std::fmt::Debug for Pacemaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacemaker")
            .field("heartrate", &self.heartrate)
            .field("sent_at", &self.sent_at.get())
            .field("echo_at", &self.echo_at.get())
            .finish()
    }
}
