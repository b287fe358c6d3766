//! Session re-validation scheduling.
//!
//! One tab runs the authoritative check loop: after an initial delay it
//! polls a caller-supplied probe, and as soon as the probe reports the
//! session as expiring soon it trades the interval for a single precise
//! timeout at the remaining lifetime. Re-arming or stopping always cancels
//! whatever timer is pending, so no two timers for the same purpose can
//! fire concurrently.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::watch, time::sleep};

use authkit_core::SessionRecord;
use authkit_store::StorageArea;

/// Outcome of one session-validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionValidity {
    /// The session is gone; stop all timers and notify.
    Invalid,
    /// The session is live for at least `remaining`.
    Valid {
        /// Time left until the session expires.
        remaining: Duration,
    },
}

/// Caller-supplied "is this session still valid" check.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Performs one validity check.
    async fn check(&self) -> SessionValidity;
}

/// Probe that judges validity from the shared session record alone, with no
/// network round trip.
pub struct RecordProbe {
    storage: Arc<dyn StorageArea>,
}

impl RecordProbe {
    /// Creates a probe reading the record from `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageArea>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SessionProbe for RecordProbe {
    async fn check(&self) -> SessionValidity {
        match SessionRecord::load(self.storage.as_ref()) {
            Ok(Some(record)) if record.is_valid() => SessionValidity::Valid {
                remaining: record.remaining(),
            },
            Ok(_) => SessionValidity::Invalid,
            Err(err) => {
                tracing::warn!(%err, "session record unreadable, treating as invalid");
                SessionValidity::Invalid
            }
        }
    }
}

/// Timing configuration for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Delay before the first probe.
    pub initial_delay: Duration,
    /// Polling interval while the session is comfortably valid.
    pub interval: Duration,
    /// Remaining lifetime at which polling switches to one precise timeout.
    pub expiry_cutoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(30),
            expiry_cutoff: Duration::from_secs(60),
        }
    }
}

/// Owns the timers of the session check loop.
#[derive(Debug)]
pub struct SessionScheduler {
    config: SchedulerConfig,
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl SessionScheduler {
    /// Creates a scheduler; nothing runs until [`Self::start`].
    #[must_use]
    pub const fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cancel: Mutex::new(None),
        }
    }

    /// Starts the check loop, cancelling any previous one.
    ///
    /// `on_expired` fires exactly once, either when the probe reports the
    /// session invalid or when the precise expiry timeout elapses.
    pub fn start<F>(&self, probe: Arc<dyn SessionProbe>, on_expired: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut cancelled = self.arm();
        let config = self.config;
        tokio::spawn(async move {
            tokio::select! {
                () = sleep(config.initial_delay) => {}
                _ = cancelled.changed() => return,
            }
            loop {
                match probe.check().await {
                    SessionValidity::Invalid => {
                        tracing::debug!("session probe reported invalid");
                        on_expired();
                        return;
                    }
                    SessionValidity::Valid { remaining }
                        if remaining <= config.expiry_cutoff =>
                    {
                        // Expires soon: one precise timeout, no more polling.
                        tracing::debug!(?remaining, "arming precise expiry timeout");
                        tokio::select! {
                            () = sleep(remaining) => on_expired(),
                            _ = cancelled.changed() => {}
                        }
                        return;
                    }
                    SessionValidity::Valid { .. } => {
                        tokio::select! {
                            () = sleep(config.interval) => {}
                            _ = cancelled.changed() => return,
                        }
                    }
                }
            }
        });
    }

    /// Cancels whatever timer is pending.
    pub fn stop(&self) {
        if let Some(cancel) = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = cancel.send(true);
        }
    }

    fn arm(&self) -> watch::Receiver<bool> {
        let mut guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.take() {
            let _ = previous.send(true);
        }
        let (tx, rx) = watch::channel(false);
        *guard = Some(tx);
        rx
    }
}

impl Drop for SessionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
