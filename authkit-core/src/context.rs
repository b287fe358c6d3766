//! The flow composition root.
//!
//! Everything the engine touches (transport, storage, platform
//! authenticator, navigator, ceremony coordinator, event dispatcher) is
//! owned by one [`FlowContext`] and injected through its builder. There is
//! no process-wide state, so tests substitute a fake per run.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use authkit_store::{MemoryArea, StorageArea};

use crate::{
    ceremony::{CeremonyCoordinator, PlatformAuthenticator, UnsupportedAuthenticator},
    error::AuthKitError,
    events::{Dispatcher, FlowEvent},
    transport::{Transport, DEFAULT_TIMEOUT},
};

/// Static configuration for a flow client.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Base URL of the flow endpoint, e.g. `https://auth.example.com`.
    pub api_base_url: String,
    /// Fixed per-request transport timeout.
    pub timeout: Duration,
    /// Prefix for every storage key this client writes.
    pub storage_key_prefix: String,
}

impl FlowConfig {
    /// Creates a configuration with default timeout and key prefix.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            storage_key_prefix: "authkit".to_string(),
        }
    }

    /// Returns the storage key of the persisted snapshot for `flow_name`.
    #[must_use]
    pub fn flow_storage_key(&self, flow_name: &str) -> String {
        format!("{}::flow::{flow_name}", self.storage_key_prefix)
    }

    /// Resolves an action `href` against the base URL.
    ///
    /// Absolute hrefs are used as-is; everything else is joined onto the
    /// base.
    #[must_use]
    pub fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            let base = self.api_base_url.trim_end_matches('/');
            let path = href.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }
}

/// Client capabilities reported during preflight negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Whether a platform authenticator is available.
    pub webauthn_available: bool,
    /// Whether conditional (autofill) mediation is available.
    pub conditional_mediation_available: bool,
}

/// Host hook used by the third-party auto-step to leave the current origin.
pub trait Navigator: Send + Sync {
    /// Navigates the host away to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the navigation.
    fn navigate(&self, url: &str) -> Result<(), AuthKitError>;
}

/// Navigator that only records the intent in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, url: &str) -> Result<(), AuthKitError> {
        tracing::debug!(url, "navigation requested, no navigator installed");
        Ok(())
    }
}

/// Shared dependencies of every state, action and auto-step of a client.
pub struct FlowContext {
    pub(crate) config: FlowConfig,
    pub(crate) transport: Transport,
    pub(crate) storage: Arc<dyn StorageArea>,
    pub(crate) authenticator: Arc<dyn PlatformAuthenticator>,
    pub(crate) capabilities: ClientCapabilities,
    pub(crate) ceremony: CeremonyCoordinator,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) events: Dispatcher<FlowEvent>,
}

impl FlowContext {
    /// Starts building a context for `config`.
    #[must_use]
    pub fn builder(config: FlowConfig) -> FlowContextBuilder {
        FlowContextBuilder {
            config,
            storage: None,
            authenticator: None,
            navigator: None,
            capabilities: ClientCapabilities::default(),
        }
    }

    /// The configuration this context was built with.
    #[must_use]
    pub const fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Flow event dispatcher; subscribe here for before/after state-change
    /// notifications.
    #[must_use]
    pub const fn events(&self) -> &Dispatcher<FlowEvent> {
        &self.events
    }

    /// The storage area this context persists into.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn StorageArea> {
        Arc::clone(&self.storage)
    }

    /// The ceremony coordinator owned by this context.
    #[must_use]
    pub const fn ceremony(&self) -> &CeremonyCoordinator {
        &self.ceremony
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FlowContext`].
///
/// Omitted dependencies fall back to inert defaults: an ephemeral in-memory
/// storage handle, an authenticator that reports ceremonies as unsupported
/// and a navigator that only logs.
pub struct FlowContextBuilder {
    config: FlowConfig,
    storage: Option<Arc<dyn StorageArea>>,
    authenticator: Option<Arc<dyn PlatformAuthenticator>>,
    navigator: Option<Arc<dyn Navigator>>,
    capabilities: ClientCapabilities,
}

impl FlowContextBuilder {
    /// Uses `storage` as the shared storage area.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn StorageArea>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses `authenticator` for credential ceremonies.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn PlatformAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Uses `navigator` for third-party handoffs.
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Reports `capabilities` during preflight negotiation.
    #[must_use]
    pub const fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> Arc<FlowContext> {
        let transport = Transport::new(self.config.timeout);
        Arc::new(FlowContext {
            config: self.config,
            transport,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryArea::new().handle())),
            authenticator: self
                .authenticator
                .unwrap_or_else(|| Arc::new(UnsupportedAuthenticator)),
            capabilities: self.capabilities,
            ceremony: CeremonyCoordinator::new(),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator)),
            events: Dispatcher::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_hrefs_against_base() {
        let config = FlowConfig::new("https://auth.example.com/");
        assert_eq!(config.resolve("/x"), "https://auth.example.com/x");
        assert_eq!(config.resolve("login"), "https://auth.example.com/login");
        assert_eq!(
            config.resolve("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn flow_storage_keys_are_scoped_per_flow() {
        let config = FlowConfig::new("https://auth.example.com");
        assert_eq!(config.flow_storage_key("login"), "authkit::flow::login");
        assert_ne!(
            config.flow_storage_key("login"),
            config.flow_storage_key("registration")
        );
    }
}
