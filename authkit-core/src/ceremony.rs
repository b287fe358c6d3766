//! Credential ceremony coordination.
//!
//! A ceremony is a platform credential creation/assertion request
//! (WebAuthn-style). The platform can only show one prompt at a time, so all
//! ceremony calls go through a single [`CeremonyCoordinator`] that cancels
//! whatever request preceded the new one. The cryptographic internals are
//! the platform's business; this module only times, cancels and sequences.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

/// Failure modes of a credential ceremony.
///
/// Ceremony errors are recoverable, per-turn outcomes: the auto-step engine
/// converts them into a `back` transition with a synthetic
/// [`crate::document::FlowError`] instead of propagating them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CeremonyError {
    /// The request was cancelled, by the user or by a newer request.
    #[error("ceremony_cancelled")]
    Cancelled,

    /// The platform refused the operation (user verification failed,
    /// permission denied).
    #[error("ceremony_not_allowed")]
    NotAllowed,

    /// The presented credential does not match what the server challenged.
    #[error("credential_mismatch")]
    Mismatch,

    /// No platform authenticator is available on this host.
    #[error("ceremony_unsupported")]
    Unsupported,

    /// Any other platform-reported failure.
    #[error("platform_error: {0}")]
    Platform(String),
}

/// Cancellation signal handed to every platform authenticator call.
///
/// The signal fires when a newer ceremony supersedes this one or when the
/// coordinator is cancelled outright.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the request is cancelled.
    ///
    /// Resolves immediately if cancellation already happened; also resolves
    /// when the coordinator goes away, since no prompt should outlive it.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Host-implemented platform authenticator.
///
/// Options and credentials are opaque JSON documents: the server produces
/// the options, the platform produces the credential, and the engine posts
/// it back without interpreting either.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Runs a credential-creation ceremony (registration).
    ///
    /// Implementations should watch `cancel` and abort the platform prompt
    /// with [`CeremonyError::Cancelled`] when it fires.
    async fn create_credential(
        &self,
        options: Value,
        cancel: CancelSignal,
    ) -> Result<Value, CeremonyError>;

    /// Runs a credential-assertion ceremony (login).
    async fn get_credential(
        &self,
        options: Value,
        cancel: CancelSignal,
    ) -> Result<Value, CeremonyError>;
}

/// Authenticator for hosts without platform credential support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedAuthenticator;

#[async_trait]
impl PlatformAuthenticator for UnsupportedAuthenticator {
    async fn create_credential(
        &self,
        _options: Value,
        _cancel: CancelSignal,
    ) -> Result<Value, CeremonyError> {
        Err(CeremonyError::Unsupported)
    }

    async fn get_credential(
        &self,
        _options: Value,
        _cancel: CancelSignal,
    ) -> Result<Value, CeremonyError> {
        Err(CeremonyError::Unsupported)
    }
}

/// Coordinator guaranteeing at most one in-flight platform request.
///
/// Starting a new ceremony cancels the previous one *before* the new
/// platform call begins. One instance is owned by the flow context; tests
/// construct their own per run.
#[derive(Debug, Default)]
pub struct CeremonyCoordinator {
    active: Mutex<Option<watch::Sender<bool>>>,
}

impl CeremonyCoordinator {
    /// Creates a coordinator with no outstanding request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a credential-creation ceremony through `authenticator`.
    ///
    /// # Errors
    ///
    /// Returns the ceremony failure reported by the platform, including
    /// [`CeremonyError::Cancelled`] when a newer request supersedes this
    /// one.
    pub async fn create(
        &self,
        authenticator: &dyn PlatformAuthenticator,
        options: Value,
    ) -> Result<Value, CeremonyError> {
        let cancel = self.begin();
        authenticator.create_credential(options, cancel).await
    }

    /// Runs a credential-assertion ceremony through `authenticator`.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::create`].
    pub async fn get(
        &self,
        authenticator: &dyn PlatformAuthenticator,
        options: Value,
    ) -> Result<Value, CeremonyError> {
        let cancel = self.begin();
        authenticator.get_credential(options, cancel).await
    }

    /// Cancels the outstanding request, if any, without starting a new one.
    pub fn cancel(&self) {
        if let Some(previous) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = previous.send(true);
        }
    }

    /// Cancels the previous request and installs a fresh cancel signal.
    fn begin(&self) -> CancelSignal {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            tracing::debug!("cancelling superseded ceremony request");
            let _ = previous.send(true);
        }
        let (tx, rx) = watch::channel(false);
        *active = Some(tx);
        CancelSignal { rx }
    }
}
