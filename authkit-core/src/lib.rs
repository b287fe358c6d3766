#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Core engine for AuthKit.
//!
//! Drives a server-defined, multi-step authentication conversation: fetch a
//! state document, expose its permitted actions as invocable handles, run
//! exactly one action per state, auto-step through everything that needs no
//! user input (including credential ceremonies), and repeat until a
//! terminal state.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authkit_core::{
//!     Flow, FlowConfig, FlowContext, HandlerOutcome, HandlerTable, StateName,
//! };
//!
//! # async fn run() -> Result<(), authkit_core::AuthKitError> {
//! let ctx = FlowContext::builder(FlowConfig::new("https://auth.example.com")).build();
//! let handlers = HandlerTable::new()
//!     .on(StateName::LoginInit, |state: Arc<authkit_core::State>| async move {
//!         let action = state.get_action("continue_with_login_identifier");
//!         Ok(HandlerOutcome::Action(action))
//!     })
//!     .on(StateName::Success, |_| async { Ok(HandlerOutcome::Finish) })
//!     .on_error(|err| eprintln!("flow failed: {err}"));
//!
//! Flow::new(ctx).init("login", &handlers).await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod autostep;
pub mod ceremony;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod flow;
pub mod session;
mod snapshot;
pub mod state;
mod state_name;
pub mod transport;

pub use action::{Action, InputValues, RunOptions};
pub use autostep::{AutoStep, AutoStepExclusion};
pub use ceremony::{
    CancelSignal, CeremonyCoordinator, CeremonyError, PlatformAuthenticator,
    UnsupportedAuthenticator,
};
pub use context::{
    ClientCapabilities, FlowConfig, FlowContext, FlowContextBuilder, Navigator,
    NoopNavigator,
};
pub use document::{ActionDocument, ActionRef, FlowDocument, FlowError, InputDocument};
pub use error::AuthKitError;
pub use events::{Dispatcher, FlowEvent, Subscription};
pub use flow::{Flow, HandlerOutcome, HandlerTable};
pub use session::{SessionRecord, SESSION_STORAGE_KEY};
pub use state::{CreateOptions, State};
pub use state_name::StateName;
