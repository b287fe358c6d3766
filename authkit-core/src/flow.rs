//! The flow driver.
//!
//! Intentionally minimal: the auto-step engine already absorbs every
//! no-interaction transition, so the driver only bridges user-facing
//! handlers to the next interactive state. The consumer supplies a
//! name-keyed [`HandlerTable`]; a missing entry is a configuration error,
//! not a silent no-op.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use crate::{
    action::{Action, RunOptions},
    context::FlowContext,
    error::AuthKitError,
    state::{CreateOptions, State},
    state_name::StateName,
};

/// What a state handler tells the driver to do next.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Execute this action; its result becomes the next state.
    Action(Action),
    /// Continue with this state (e.g. one obtained out of band).
    State(Arc<State>),
    /// Stop driving the flow.
    Finish,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerOutcome, AuthKitError>> + Send>>;
type Handler = Box<dyn Fn(Arc<State>) -> HandlerFuture + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&AuthKitError) + Send + Sync>;

/// Name-keyed table of state handlers supplied by the consumer.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<StateName, Handler>,
    on_error: Option<ErrorHandler>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for states named `name`.
    #[must_use]
    pub fn on<F, Fut>(mut self, name: StateName, handler: F) -> Self
    where
        F: Fn(Arc<State>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutcome, AuthKitError>> + Send + 'static,
    {
        self.handlers
            .insert(name, Box::new(move |state| Box::pin(handler(state))));
        self
    }

    /// Registers the fallback all errors funnel through.
    ///
    /// With a fallback registered, [`Flow::init`] never returns an error;
    /// without one, transport and protocol errors escape to the caller.
    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AuthKitError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    fn handler(&self, name: &StateName) -> Option<&Handler> {
        self.handlers.get(name)
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("states", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_on_error", &self.on_error.is_some())
            .finish()
    }
}

/// State-machine driver for one flow client.
#[derive(Debug, Clone)]
pub struct Flow {
    ctx: Arc<FlowContext>,
}

impl Flow {
    /// Creates a driver over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }

    /// Fetches (or rehydrates) the initial state of `flow_name` and runs
    /// the handler-dispatch loop until a handler finishes the flow.
    ///
    /// # Errors
    ///
    /// Transport and protocol errors. With an `on_error` handler
    /// registered, every error is routed there instead and `init` returns
    /// `Ok(())`.
    pub async fn init(
        &self,
        flow_name: &str,
        handlers: &HandlerTable,
    ) -> Result<(), AuthKitError> {
        match self.drive(flow_name, handlers).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let Some(on_error) = handlers.on_error.as_ref() else {
                    return Err(err);
                };
                tracing::debug!(%err, "routing flow error to on_error handler");
                on_error(&err);
                Ok(())
            }
        }
    }

    /// Runs the dispatch loop starting from `state`.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::init`].
    pub async fn run(
        &self,
        mut state: Arc<State>,
        handlers: &HandlerTable,
    ) -> Result<(), AuthKitError> {
        loop {
            let name = state.name().clone();
            let Some(handler) = handlers.handler(&name) else {
                return Err(AuthKitError::HandlerNotFound(name));
            };
            tracing::debug!(state = %name, "dispatching to handler");
            match handler(Arc::clone(&state)).await? {
                HandlerOutcome::Action(action) => {
                    state = action.run(None, RunOptions::default()).await?;
                }
                HandlerOutcome::State(next) => state = next,
                HandlerOutcome::Finish => return Ok(()),
            }
        }
    }

    async fn drive(
        &self,
        flow_name: &str,
        handlers: &HandlerTable,
    ) -> Result<(), AuthKitError> {
        let state = State::create(
            Arc::clone(&self.ctx),
            flow_name,
            CreateOptions::default(),
        )
        .await?;
        self.run(state, handlers).await
    }
}
