//! The session lifecycle relay.
//!
//! Composes the event dispatcher, the scheduler, the cross-tab channel and
//! a storage-change observer into the public session-lifecycle API.
//! However a transition is noticed (own announcement, sibling broadcast,
//! storage mutation, probe verdict), the relay turns it into one
//! consistent, throttled stream of [`SessionEvent`]s.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::task::JoinHandle;

use authkit_core::{
    AuthKitError, Dispatcher, SessionRecord, Subscription, SESSION_STORAGE_KEY,
};
use authkit_store::SharedArea;

use crate::{
    channel::{ChannelAction, ChannelEndpoint, SessionChannel},
    scheduler::{SessionProbe, SessionScheduler},
    throttle::{Throttle, ThrottleOptions},
};

/// Session metadata carried on [`SessionEvent::Created`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetail {
    /// Identifier of the signed-in user.
    pub user_id: String,
    /// Absolute expiration time, unix seconds.
    pub expiration: u64,
}

impl From<&SessionRecord> for SessionDetail {
    fn from(record: &SessionRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            expiration: record.expiration,
        }
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session became available.
    Created(SessionDetail),
    /// The session ended (expiry, logout elsewhere, probe verdict).
    Expired,
    /// The user logged out through this client.
    LoggedOut,
    /// The user's account was deleted.
    UserDeleted,
}

/// Configuration for a [`SessionRelay`].
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Timing of the polling loop.
    pub scheduler: crate::scheduler::SchedulerConfig,
    /// Collapse window for duplicate event triggers.
    pub throttle_window: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scheduler: crate::scheduler::SchedulerConfig::default(),
            throttle_window: Duration::from_secs(1),
        }
    }
}

/// Throttled dispatch of session events, one window per event type.
#[derive(Clone)]
struct Emitter {
    events: Dispatcher<SessionEvent>,
    created: Throttle,
    expired: Throttle,
    logged_out: Throttle,
    user_deleted: Throttle,
}

impl Emitter {
    fn new(events: Dispatcher<SessionEvent>, window: Duration) -> Self {
        let throttle = || Throttle::new(ThrottleOptions::leading(window));
        Self {
            events,
            created: throttle(),
            expired: throttle(),
            logged_out: throttle(),
            user_deleted: throttle(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let throttle = match &event {
            SessionEvent::Created(_) => &self.created,
            SessionEvent::Expired => &self.expired,
            SessionEvent::LoggedOut => &self.logged_out,
            SessionEvent::UserDeleted => &self.user_deleted,
        };
        let events = self.events.clone();
        throttle.run(move || events.dispatch(&event));
    }
}

/// The public session-lifecycle API of one client.
pub struct SessionRelay {
    storage: Arc<dyn SharedArea>,
    endpoint: ChannelEndpoint,
    scheduler: Arc<SessionScheduler>,
    emitter: Emitter,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRelay {
    /// Creates a relay over the shared `storage` area and session
    /// `channel`. Nothing runs until [`Self::start`].
    #[must_use]
    pub fn new(
        storage: Arc<dyn SharedArea>,
        channel: &SessionChannel,
        config: RelayConfig,
    ) -> Self {
        Self {
            storage,
            endpoint: channel.endpoint(),
            scheduler: Arc::new(SessionScheduler::new(config.scheduler)),
            emitter: Emitter::new(Dispatcher::new(), config.throttle_window),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registers an observer for session events.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.emitter.events.subscribe(observer)
    }

    /// Starts observing storage and channel, claims the polling leadership
    /// and arms the scheduler with `probe`.
    ///
    /// The leadership request makes every other relay on the channel stop
    /// its own polling loop, so only the most recently started tab polls;
    /// all tabs keep observing storage and channel regardless.
    pub fn start(&self, probe: Arc<dyn SessionProbe>) {
        self.stop();
        self.spawn_storage_observer();
        self.spawn_channel_observer();

        self.endpoint.send(ChannelAction::RequestLeadership);

        let emitter = self.emitter.clone();
        let endpoint = self.endpoint.clone();
        self.scheduler.start(probe, move || {
            emitter.emit(SessionEvent::Expired);
            endpoint.send(ChannelAction::SessionExpired);
        });
    }

    /// Stops the polling loop and both observers.
    pub fn stop(&self) {
        self.scheduler.stop();
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }

    /// Publishes a freshly created session: writes the shared record,
    /// notifies siblings and emits [`SessionEvent::Created`] locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn announce_created(&self, record: &SessionRecord) -> Result<(), AuthKitError> {
        record.store(self.storage.as_ref())?;
        self.endpoint.send(ChannelAction::SessionCreated);
        self.emitter
            .emit(SessionEvent::Created(SessionDetail::from(record)));
        Ok(())
    }

    /// Publishes the end of the session: clears the shared record,
    /// notifies siblings and emits [`SessionEvent::Expired`] locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be cleared.
    pub fn announce_expired(&self) -> Result<(), AuthKitError> {
        SessionRecord::clear(self.storage.as_ref())?;
        self.endpoint.send(ChannelAction::SessionExpired);
        self.emitter.emit(SessionEvent::Expired);
        Ok(())
    }

    /// Reports a logout performed through this client. Siblings observe the
    /// cleared record; locally [`SessionEvent::LoggedOut`] is emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be cleared.
    pub fn notify_logout(&self) -> Result<(), AuthKitError> {
        SessionRecord::clear(self.storage.as_ref())?;
        self.endpoint.send(ChannelAction::SessionExpired);
        self.emitter.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Reports that the user's account was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be cleared.
    pub fn notify_user_deleted(&self) -> Result<(), AuthKitError> {
        SessionRecord::clear(self.storage.as_ref())?;
        self.endpoint.send(ChannelAction::SessionExpired);
        self.emitter.emit(SessionEvent::UserDeleted);
        Ok(())
    }

    /// Re-reads the session record and fires created/expired accordingly.
    /// This is how a logout in one tab reaches every other tab without a
    /// network round trip.
    fn spawn_storage_observer(&self) {
        let mut watcher = self.storage.watch();
        let storage = Arc::clone(&self.storage);
        let emitter = self.emitter.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = watcher.next().await {
                if change.key != SESSION_STORAGE_KEY {
                    continue;
                }
                match SessionRecord::load(storage.as_ref()) {
                    Ok(Some(record)) if record.is_valid() => {
                        emitter.emit(SessionEvent::Created(SessionDetail::from(&record)));
                    }
                    Ok(_) => emitter.emit(SessionEvent::Expired),
                    Err(err) => {
                        tracing::warn!(%err, "session record unreadable after change");
                        emitter.emit(SessionEvent::Expired);
                    }
                }
            }
        });
        self.track(task);
    }

    fn spawn_channel_observer(&self) {
        let mut listener = self.endpoint.listen();
        let storage = Arc::clone(&self.storage);
        let emitter = self.emitter.clone();
        let scheduler = Arc::clone(&self.scheduler);
        let task = tokio::spawn(async move {
            while let Some(message) = listener.recv().await {
                match message.action {
                    ChannelAction::SessionExpired => emitter.emit(SessionEvent::Expired),
                    ChannelAction::SessionCreated => {
                        // Trust but verify: read the record the sibling wrote.
                        if let Ok(Some(record)) = SessionRecord::load(storage.as_ref())
                        {
                            if record.is_valid() {
                                emitter.emit(SessionEvent::Created(
                                    SessionDetail::from(&record),
                                ));
                            }
                        }
                    }
                    ChannelAction::RequestLeadership => {
                        tracing::debug!(
                            sender = %message.sender,
                            "yielding polling leadership"
                        );
                        scheduler.stop();
                    }
                }
            }
        });
        self.track(task);
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

impl Drop for SessionRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRelay")
            .field("endpoint", &self.endpoint.id())
            .finish_non_exhaustive()
    }
}
