//! Action handles.
//!
//! An [`Action`] is a typed, invocable handle bound to one state's
//! permitted operation. Invoking it never mutates the parent state beyond
//! the single-use marker; it produces a brand-new state built through the
//! same initializer as a fresh fetch, so auto-stepping applies uniformly to
//! every transition.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::{
    autostep::initialize_flow_state,
    document::{ActionDocument, ActionRef, InputDocument},
    error::AuthKitError,
    events::FlowEvent,
    state::State,
};

/// Caller-supplied input values for an action invocation.
pub type InputValues = Map<String, Value>;

/// Options for [`Action::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Whether to emit before/after state-change events for this
    /// transition. Disable to chain several transitions silently and notify
    /// observers once at the end.
    pub dispatch_events: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dispatch_events: true,
        }
    }
}

/// One permitted, single-use operation attached to a state.
#[derive(Debug, Clone)]
pub struct Action {
    document: ActionDocument,
    enabled: bool,
    state: Arc<State>,
}

impl Action {
    pub(crate) const fn from_document(document: ActionDocument, state: Arc<State>) -> Self {
        Self {
            document,
            enabled: true,
            state,
        }
    }

    /// Disabled placeholder for a name the server did not declare.
    pub(crate) fn disabled(name: &str, state: Arc<State>) -> Self {
        Self {
            document: ActionDocument {
                action: name.to_string(),
                href: String::new(),
                inputs: std::collections::BTreeMap::new(),
                description: String::new(),
            },
            enabled: false,
            state,
        }
    }

    /// The action's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.document.action
    }

    /// Whether the server permits this action on the current state.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Declared input fields, with server defaults and validation bounds.
    #[must_use]
    pub const fn inputs(&self) -> &std::collections::BTreeMap<String, InputDocument> {
        &self.document.inputs
    }

    /// The state this handle is bound to.
    #[must_use]
    pub const fn state(&self) -> &Arc<State> {
        &self.state
    }

    /// Invokes the action and returns the state it leads to.
    ///
    /// Server-declared default input values are merged with `values`
    /// (caller wins on conflict) and posted as
    /// `{"input_data": …, "csrf_token": …}` to the action's href. The
    /// flow's persisted snapshot is cleared when the request is issued so a
    /// stale snapshot is never replayed after forward progress.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::ActionDisabled`] for placeholder actions,
    /// [`AuthKitError::ActionAlreadyInvoked`] when the parent state already
    /// had an action invoked, plus any transport error from the round trip.
    pub async fn run(
        &self,
        values: Option<InputValues>,
        options: RunOptions,
    ) -> Result<Arc<State>, AuthKitError> {
        self.invoke(values, options.dispatch_events, true).await
    }

    /// Invocation variant used by auto-steps: no events, no auto-stepping.
    /// The caller's loop keeps evaluating the returned raw state.
    pub(crate) async fn run_raw(
        &self,
        values: Option<InputValues>,
    ) -> Result<Arc<State>, AuthKitError> {
        self.invoke(values, false, false).await
    }

    async fn invoke(
        &self,
        values: Option<InputValues>,
        dispatch_events: bool,
        run_auto_steps: bool,
    ) -> Result<Arc<State>, AuthKitError> {
        if !self.enabled {
            return Err(AuthKitError::ActionDisabled(self.name().to_string()));
        }

        let action_ref = ActionRef {
            name: self.document.action.clone(),
            related_state_name: self.state.name().clone(),
        };
        self.state.mark_invoked(action_ref.clone())?;

        let ctx = self.state.context();
        if dispatch_events {
            ctx.events.dispatch(&FlowEvent::BeforeStateChange {
                state: Arc::clone(&self.state),
            });
        }

        let body = json!({
            "input_data": Value::Object(self.merged_input_values(values)),
            "csrf_token": self.state.csrf_token(),
        });
        let url = ctx.config.resolve(&self.document.href);
        tracing::debug!(action = %self.document.action, %url, "invoking action");

        self.state.clear_snapshot();
        let document = ctx.transport.post_document(&url, &body).await?;

        let next = State::from_document(
            Arc::clone(ctx),
            self.state.flow_name(),
            document,
            self.state.exclude().clone(),
            false,
            Some(action_ref),
        );
        let next = if run_auto_steps {
            Box::pin(initialize_flow_state(next)).await?
        } else {
            next
        };

        if dispatch_events {
            ctx.events.dispatch(&FlowEvent::AfterStateChange {
                state: Arc::clone(&next),
            });
        }
        Ok(next)
    }

    /// Server defaults first, caller values on top.
    fn merged_input_values(&self, values: Option<InputValues>) -> InputValues {
        let mut merged = InputValues::new();
        for (field, input) in &self.document.inputs {
            if let Some(default) = &input.value {
                merged.insert(field.clone(), default.clone());
            }
        }
        if let Some(values) = values {
            for (field, value) in values {
                merged.insert(field, value);
            }
        }
        merged
    }
}
