use thiserror::Error;

use authkit_store::StoreError;

use crate::state_name::StateName;

/// Error outputs from AuthKit.
///
/// Only transport and protocol failures surface here. Domain errors
/// (server-side validation) and ceremony failures travel as data on
/// [`crate::document::FlowError`] instead, because they are expected,
/// recoverable outcomes of the conversation.
#[derive(Debug, Error)]
pub enum AuthKitError {
    /// The flow endpoint did not answer within the configured timeout.
    /// No retry is performed by this layer.
    #[error("request_timeout")]
    RequestTimeout,

    /// The flow endpoint was unreachable or the connection failed.
    #[error("network_error: {0}")]
    Network(String),

    /// The response was not a valid flow document.
    #[error("malformed_response: {0}")]
    MalformedResponse(String),

    /// A disabled (or unknown) action was invoked.
    #[error("action_disabled: {0}")]
    ActionDisabled(String),

    /// The parent state has already had an action invoked.
    #[error("action_already_invoked: {0}")]
    ActionAlreadyInvoked(String),

    /// No handler is registered for the reached state and no `on_error`
    /// fallback was supplied.
    #[error("handler_not_found: {0}")]
    HandlerNotFound(StateName),

    /// Persistence was required (third-party redirect bookkeeping) but the
    /// storage area is unavailable.
    #[error("storage_unavailable: {0}")]
    StorageUnavailable(String),

    /// Unexpected serialization failure.
    #[error("serialization_error: {0}")]
    Serialization(String),

    /// Errors coming from the storage area.
    #[error(transparent)]
    Store(#[from] StoreError),
}
