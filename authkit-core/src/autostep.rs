//! The auto-step engine.
//!
//! Some states must transition without end-user input: capability
//! negotiation, ceremony execution, third-party redirect bookkeeping,
//! terminal finalization. Membership is a lookup table keyed by
//! [`StateName`], so adding an auto-steppable state is a compile-time
//! checked table entry, and every state transition funnels through
//! [`initialize_flow_state`] so the chain runs uniformly no matter how the
//! state was reached.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    action::InputValues,
    ceremony::CeremonyError,
    document::FlowError,
    error::AuthKitError,
    session::SessionRecord,
    state::State,
    state_name::StateName,
};

/// Action invoked by ceremony and redirect auto-steps to retreat one step.
pub const BACK: &str = "back";
/// Action invoked by the preflight auto-step.
pub const REGISTER_CLIENT_CAPABILITIES: &str = "register_client_capabilities";
/// Action carrying a created credential back to the server.
pub const VERIFY_ATTESTATION: &str = "verify_attestation";
/// Action carrying an asserted credential back to the server.
pub const VERIFY_ASSERTION: &str = "verify_assertion";

/// Which auto-steps to skip while initializing a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AutoStepExclusion {
    /// Run every auto-step (the default).
    #[default]
    None,
    /// Sentinel disabling every auto-step.
    All,
    /// Skip auto-steps for exactly these state names.
    Named(Vec<StateName>),
}

impl AutoStepExclusion {
    /// Whether the auto-step for `name` must be skipped.
    #[must_use]
    pub fn excludes(&self, name: &StateName) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Named(names) => names.contains(name),
        }
    }
}

/// The registered no-interaction transition of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStep {
    /// Capability negotiation.
    Preflight,
    /// Credential-creation ceremony.
    PasskeyCreate,
    /// Credential-assertion ceremony.
    PasskeyVerify,
    /// Third-party provider handoff.
    Thirdparty,
    /// Success finalization (snapshot cleanup, session record).
    Success,
    /// Account-deletion finalization (snapshot cleanup).
    AccountDeleted,
}

impl AutoStep {
    /// Looks up the auto-step registered for `name`.
    #[must_use]
    pub const fn for_state(name: &StateName) -> Option<Self> {
        match name {
            StateName::Preflight => Some(Self::Preflight),
            StateName::PasskeyCreate => Some(Self::PasskeyCreate),
            StateName::PasskeyVerify => Some(Self::PasskeyVerify),
            StateName::Thirdparty => Some(Self::Thirdparty),
            StateName::Success => Some(Self::Success),
            StateName::AccountDeleted => Some(Self::AccountDeleted),
            _ => None,
        }
    }

    pub(crate) async fn run(self, state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
        match self {
            Self::Preflight => register_capabilities(state).await,
            Self::PasskeyCreate => run_create_ceremony(state).await,
            Self::PasskeyVerify => run_verify_ceremony(state).await,
            Self::Thirdparty => thirdparty_handoff(state).await,
            Self::Success => finalize_success(state),
            Self::AccountDeleted => finalize_account_deleted(state),
        }
    }
}

/// Runs the auto-step chain on a freshly constructed state.
///
/// Terminates when the current state has no auto-step, the auto-step is
/// excluded, or the step returns a state with the *same* name. That
/// fixed-point rule lets a handler stay (e.g. to report an error on its
/// own state) without looping forever.
pub(crate) async fn initialize_flow_state(
    mut state: Arc<State>,
) -> Result<Arc<State>, AuthKitError> {
    loop {
        let Some(step) = state.auto_step() else {
            return Ok(state);
        };
        if state.exclude().excludes(state.name()) {
            tracing::debug!(state = %state.name(), "auto-step excluded by caller");
            return Ok(state);
        }
        tracing::debug!(state = %state.name(), ?step, "running auto-step");
        let next = step.run(&state).await?;
        if next.name() == state.name() {
            return Ok(next);
        }
        state = next;
    }
}

async fn register_capabilities(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    let action = state.get_action(REGISTER_CLIENT_CAPABILITIES);
    if !action.enabled() {
        return Ok(Arc::clone(state));
    }
    let capabilities = serde_json::to_value(state.context().capabilities)
        .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
    let Value::Object(values) = capabilities else {
        return Err(AuthKitError::Serialization(
            "capabilities must serialize to an object".to_string(),
        ));
    };
    action.run_raw(Some(values)).await
}

async fn run_create_ceremony(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    let ctx = state.context();
    let options = state.payload().cloned().unwrap_or(Value::Null);
    match ctx.ceremony.create(ctx.authenticator.as_ref(), options).await {
        Ok(credential) => submit_credential(state, VERIFY_ATTESTATION, credential).await,
        Err(err) => retreat_with_error(state, &err).await,
    }
}

async fn run_verify_ceremony(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    let ctx = state.context();
    let options = state.payload().cloned().unwrap_or(Value::Null);
    match ctx.ceremony.get(ctx.authenticator.as_ref(), options).await {
        Ok(credential) => submit_credential(state, VERIFY_ASSERTION, credential).await,
        Err(err) => retreat_with_error(state, &err).await,
    }
}

async fn submit_credential(
    state: &Arc<State>,
    action_name: &str,
    credential: Value,
) -> Result<Arc<State>, AuthKitError> {
    let action = state.get_action(action_name);
    let mut values = InputValues::new();
    values.insert("public_key_credential".to_string(), credential);
    action.run_raw(Some(values)).await
}

/// Ceremony failures never abort the flow: retreat one step and attach a
/// synthetic error to the state we land on.
async fn retreat_with_error(
    state: &Arc<State>,
    error: &CeremonyError,
) -> Result<Arc<State>, AuthKitError> {
    tracing::warn!(state = %state.name(), %error, "ceremony failed, retreating one step");
    let back = state.get_action(BACK);
    if !back.enabled() {
        return Ok(state.with_error(FlowError::from_ceremony(error)));
    }
    let previous = back.run_raw(None).await?;
    Ok(previous.with_error(FlowError::from_ceremony(error)))
}

async fn thirdparty_handoff(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    if state.from_persistence() {
        // Resumed after returning from the provider: the redirect's purpose
        // is fulfilled, so going forward means going back.
        let back = state.get_action(BACK);
        if !back.enabled() {
            return Ok(Arc::clone(state));
        }
        return back.run_raw(None).await;
    }

    state
        .persist()
        .map_err(|err| AuthKitError::StorageUnavailable(err.to_string()))?;

    let url = state
        .payload()
        .and_then(|payload| payload.get("redirect_url"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AuthKitError::MalformedResponse(
                "thirdparty state without redirect_url".to_string(),
            )
        })?;
    tracing::debug!(url, "handing off to third-party provider");
    state.context().navigator.navigate(url)?;
    Ok(Arc::clone(state))
}

fn finalize_success(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    state.clear_snapshot();
    if let Some(record) = state.payload().and_then(session_claims) {
        if let Err(err) = record.store(state.context().storage.as_ref()) {
            tracing::warn!(%err, "failed to store session record on success");
        }
    }
    Ok(Arc::clone(state))
}

fn finalize_account_deleted(state: &Arc<State>) -> Result<Arc<State>, AuthKitError> {
    state.clear_snapshot();
    Ok(Arc::clone(state))
}

fn session_claims(payload: &Value) -> Option<SessionRecord> {
    let user_id = payload.get("user_id")?.as_str()?;
    let expiration_seconds = payload.get("expiration_seconds")?.as_u64()?;
    let auth_flow_completed = payload
        .get("auth_flow_completed")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    Some(SessionRecord::expiring_in(
        user_id,
        expiration_seconds,
        auth_flow_completed,
    ))
}
