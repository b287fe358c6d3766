#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session lifecycle relay for AuthKit.
//!
//! Keeps a session's lifecycle consistent across sibling clients of one
//! origin: a [`SessionRelay`] schedules expiration notifications, reacts to
//! storage mutations performed by siblings, exchanges direct broadcasts
//! over a [`SessionChannel`], and de-duplicates the resulting event stream
//! through leading-edge throttling.

pub mod channel;
pub mod relay;
pub mod scheduler;
pub mod throttle;

pub use channel::{ChannelAction, ChannelEndpoint, ChannelListener, ChannelMessage, SessionChannel};
pub use relay::{RelayConfig, SessionDetail, SessionEvent, SessionRelay};
pub use scheduler::{
    RecordProbe, SchedulerConfig, SessionProbe, SessionScheduler, SessionValidity,
};
pub use throttle::{Throttle, ThrottleOptions};
