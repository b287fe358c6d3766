//! Flow states.
//!
//! A [`State`] is one immutable snapshot of a flow conversation turn. It is
//! created by deserializing a server response or a persisted snapshot, hands
//! out [`Action`] handles for its permitted operations, and is superseded by
//! the fresh `State` an action invocation produces. The single mutable cell
//! is the invoked-action marker that makes each turn single-use.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::Value;

use crate::{
    action::Action,
    autostep::{initialize_flow_state, AutoStep, AutoStepExclusion},
    context::FlowContext,
    document::{ActionRef, FlowDocument, FlowError},
    error::AuthKitError,
    snapshot::FlowSnapshot,
    state_name::StateName,
};

/// Options for [`State::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Auto-steps to skip while initializing this flow.
    pub exclude_auto_steps: AutoStepExclusion,
}

/// One immutable conversation turn of a flow.
pub struct State {
    ctx: Arc<FlowContext>,
    name: StateName,
    flow_name: String,
    status: u16,
    payload: Option<Value>,
    error: Option<FlowError>,
    csrf_token: String,
    actions: BTreeMap<String, crate::document::ActionDocument>,
    previous_action: Option<ActionRef>,
    invoked_action: Mutex<Option<ActionRef>>,
    exclude: AutoStepExclusion,
    from_persistence: bool,
}

impl State {
    /// Returns a ready state for `flow_name`.
    ///
    /// If a persisted snapshot exists for the flow it is rehydrated (and
    /// auto-steps are re-evaluated against `options.exclude_auto_steps`);
    /// otherwise a fresh state is fetched from `{api_base_url}/{flow_name}`.
    ///
    /// # Errors
    ///
    /// Transport errors from the initial fetch, storage errors from the
    /// snapshot slot, and any error an auto-step raises.
    pub async fn create(
        ctx: Arc<FlowContext>,
        flow_name: &str,
        options: CreateOptions,
    ) -> Result<Arc<Self>, AuthKitError> {
        let key = ctx.config.flow_storage_key(flow_name);
        let state = match FlowSnapshot::load(ctx.storage.as_ref(), &key)? {
            Some(snapshot) => {
                tracing::debug!(flow = flow_name, "rehydrating persisted flow snapshot");
                Self::from_document(
                    Arc::clone(&ctx),
                    flow_name,
                    snapshot.document,
                    options.exclude_auto_steps,
                    true,
                    snapshot.previous_action,
                )
            }
            None => {
                let url = ctx.config.resolve(flow_name);
                let document = ctx
                    .transport
                    .post_document(&url, &serde_json::json!({}))
                    .await?;
                Self::from_document(
                    Arc::clone(&ctx),
                    flow_name,
                    document,
                    options.exclude_auto_steps,
                    false,
                    None,
                )
            }
        };
        initialize_flow_state(state).await
    }

    /// Builds a state from a wire document. All transitions funnel through
    /// here so every state is constructed the same way.
    pub(crate) fn from_document(
        ctx: Arc<FlowContext>,
        flow_name: &str,
        document: FlowDocument,
        exclude: AutoStepExclusion,
        from_persistence: bool,
        previous_action: Option<ActionRef>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            name: document.name,
            flow_name: flow_name.to_string(),
            status: document.status,
            payload: document.payload,
            error: document.error,
            csrf_token: document.csrf_token,
            actions: document.actions,
            previous_action,
            invoked_action: Mutex::new(None),
            exclude,
            from_persistence,
        })
    }

    /// The state's name.
    #[must_use]
    pub const fn name(&self) -> &StateName {
        &self.name
    }

    /// Name of the flow this state belongs to.
    #[must_use]
    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    /// Status the server attached to this turn.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Flow-specific payload for rendering this state.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Error reported for this turn, server-sent or synthesized from a
    /// failed ceremony.
    #[must_use]
    pub const fn error(&self) -> Option<&FlowError> {
        self.error.as_ref()
    }

    /// Anti-forgery token for this turn.
    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// The action that produced this state, if any.
    #[must_use]
    pub const fn previous_action(&self) -> Option<&ActionRef> {
        self.previous_action.as_ref()
    }

    /// The action invoked *on* this state, if one already ran.
    #[must_use]
    pub fn invoked_action(&self) -> Option<ActionRef> {
        self.invoked_action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether this state was rehydrated from the persisted snapshot.
    #[must_use]
    pub const fn from_persistence(&self) -> bool {
        self.from_persistence
    }

    /// Names of the actions the server declared for this state.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Returns the action handle for `name`.
    ///
    /// Resolves for *any* queried name: names absent from the server's
    /// action map yield a disabled placeholder, so callers can probe
    /// availability without errors.
    #[must_use]
    pub fn get_action(self: &Arc<Self>, name: &str) -> Action {
        self.actions.get(name).map_or_else(
            || Action::disabled(name, Arc::clone(self)),
            |document| Action::from_document(document.clone(), Arc::clone(self)),
        )
    }

    /// The auto-step registered for this state's name, if any.
    #[must_use]
    pub fn auto_step(&self) -> Option<AutoStep> {
        AutoStep::for_state(&self.name)
    }

    pub(crate) const fn context(&self) -> &Arc<FlowContext> {
        &self.ctx
    }

    pub(crate) const fn exclude(&self) -> &AutoStepExclusion {
        &self.exclude
    }

    /// Marks this turn as used. The first caller wins; any later caller
    /// observes the marker and fails without racing the winner's request.
    pub(crate) fn mark_invoked(&self, action: ActionRef) -> Result<(), AuthKitError> {
        let mut invoked = self
            .invoked_action
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = invoked.as_ref() {
            return Err(AuthKitError::ActionAlreadyInvoked(previous.name.clone()));
        }
        *invoked = Some(action);
        Ok(())
    }

    /// Copy of this state with `error` layered on top and a fresh
    /// invocation marker. Used by ceremony auto-steps to report a failure
    /// on the state they retreated to.
    pub(crate) fn with_error(self: &Arc<Self>, error: FlowError) -> Arc<Self> {
        Arc::new(Self {
            ctx: Arc::clone(&self.ctx),
            name: self.name.clone(),
            flow_name: self.flow_name.clone(),
            status: self.status,
            payload: self.payload.clone(),
            error: Some(error),
            csrf_token: self.csrf_token.clone(),
            actions: self.actions.clone(),
            previous_action: self.previous_action.clone(),
            invoked_action: Mutex::new(None),
            exclude: self.exclude.clone(),
            from_persistence: self.from_persistence,
        })
    }

    /// Serializes this state into the flow's snapshot slot.
    pub(crate) fn persist(&self) -> Result<(), AuthKitError> {
        let snapshot = FlowSnapshot {
            document: self.to_document(),
            previous_action: self.previous_action.clone(),
        };
        let key = self.ctx.config.flow_storage_key(&self.flow_name);
        snapshot.store(self.ctx.storage.as_ref(), &key)
    }

    /// Removes the flow's snapshot slot. Best effort: a failing removal
    /// must not abort a flow that is otherwise making progress.
    pub(crate) fn clear_snapshot(&self) {
        let key = self.ctx.config.flow_storage_key(&self.flow_name);
        if let Err(err) = FlowSnapshot::clear(self.ctx.storage.as_ref(), &key) {
            tracing::warn!(flow = %self.flow_name, %err, "failed to clear flow snapshot");
        }
    }

    fn to_document(&self) -> FlowDocument {
        FlowDocument {
            name: self.name.clone(),
            status: self.status,
            payload: self.payload.clone(),
            actions: self.actions.clone(),
            csrf_token: self.csrf_token.clone(),
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("flow_name", &self.flow_name)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("from_persistence", &self.from_persistence)
            .finish_non_exhaustive()
    }
}
