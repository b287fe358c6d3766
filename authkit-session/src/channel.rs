//! Cross-tab session broadcast.
//!
//! A named topic over which sibling clients announce session transitions
//! directly, without waiting for a storage round trip, plus the leadership
//! request that keeps the polling loop on a single tab. Endpoints never
//! observe their own messages, mirroring the platform broadcast-channel
//! contract.

use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 16;

/// Message kinds spoken on the session topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    /// A sibling observed the session end.
    SessionExpired,
    /// A sibling observed a session being created.
    SessionCreated,
    /// A sibling asks to take over the polling loop.
    RequestLeadership,
}

/// One message on the session topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMessage {
    /// What happened.
    pub action: ChannelAction,
    /// Endpoint that sent the message.
    pub sender: Uuid,
}

/// The shared topic. Cheap to clone; every clone addresses the same bus.
#[derive(Debug, Clone)]
pub struct SessionChannel {
    tx: broadcast::Sender<ChannelMessage>,
}

impl SessionChannel {
    /// Creates a topic with no endpoints.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Creates a new endpoint on this topic, one per tab.
    #[must_use]
    pub fn endpoint(&self) -> ChannelEndpoint {
        ChannelEndpoint {
            id: Uuid::new_v4(),
            tx: self.tx.clone(),
        }
    }
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// A tab's connection to the topic.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    id: Uuid,
    tx: broadcast::Sender<ChannelMessage>,
}

impl ChannelEndpoint {
    /// This endpoint's identity.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Broadcasts `action` to every *other* endpoint.
    pub fn send(&self, action: ChannelAction) {
        // No listeners is fine: this tab may simply be alone.
        let _ = self.tx.send(ChannelMessage {
            action,
            sender: self.id,
        });
    }

    /// Starts listening for messages from other endpoints.
    #[must_use]
    pub fn listen(&self) -> ChannelListener {
        ChannelListener {
            id: self.id,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of an endpoint.
#[derive(Debug)]
pub struct ChannelListener {
    id: Uuid,
    rx: broadcast::Receiver<ChannelMessage>,
}

impl ChannelListener {
    /// Waits for the next message from another endpoint.
    ///
    /// Returns `None` once the topic is gone. Lagged receivers skip ahead;
    /// session messages are idempotent notifications, so missing an
    /// intermediate one is harmless.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if message.sender == self.id => {}
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "session channel lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn endpoints_do_not_hear_themselves() {
        let channel = SessionChannel::new();
        let a = channel.endpoint();
        let b = channel.endpoint();

        let mut listen_a = a.listen();
        let mut listen_b = b.listen();

        a.send(ChannelAction::SessionCreated);
        b.send(ChannelAction::SessionExpired);

        // Each endpoint only sees the other's message.
        let heard_by_b = listen_b.recv().await.unwrap();
        assert_eq!(heard_by_b.action, ChannelAction::SessionCreated);
        assert_eq!(heard_by_b.sender, a.id());

        let heard_by_a = listen_a.recv().await.unwrap();
        assert_eq!(heard_by_a.action, ChannelAction::SessionExpired);
        assert_eq!(heard_by_a.sender, b.id());
    }

    #[tokio::test]
    async fn leadership_request_reaches_all_other_endpoints() {
        let channel = SessionChannel::new();
        let newcomer = channel.endpoint();
        let old_a = channel.endpoint();
        let old_b = channel.endpoint();

        let mut listen_a = old_a.listen();
        let mut listen_b = old_b.listen();

        newcomer.send(ChannelAction::RequestLeadership);

        assert_eq!(
            listen_a.recv().await.unwrap().action,
            ChannelAction::RequestLeadership
        );
        assert_eq!(
            listen_b.recv().await.unwrap().action,
            ChannelAction::RequestLeadership
        );
    }
}
