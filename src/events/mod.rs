//! Change notification. Every write to a conversation publishes a [`ChatEvent`]
//! on one broadcast channel; subscribers see only what concerns them.
pub mod ws;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::db::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    ConversationStarted {
        conversation: String,
        participants: [String; 2],
    },
    MessageAppended {
        conversation: String,
        participants: [String; 2],
        message: Message,
    },
    UnreadChanged {
        conversation: String,
        username: String,
        count: i64,
    },
}

impl ChatEvent {
    /// Unread counters are private to their owner; the rest goes to both participants.
    pub fn concerns(&self, username: &str) -> bool {
        match self {
            ChatEvent::ConversationStarted { participants, .. }
            | ChatEvent::MessageAppended { participants, .. } => participants.iter().any(|p| p == username),
            ChatEvent::UnreadChanged { username: owner, .. } => owner == username,
        }
    }
}

#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<ChatEvent>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn publish(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            debug!("no subscribers for event");
        }
    }

    pub fn subscribe(&self, username: impl Into<String>) -> Subscription {
        Subscription {
            username: username.into(),
            rx: self.tx.subscribe(),
        }
    }
}

/// One user's view of the hub.
pub struct Subscription {
    username: String,
    rx: broadcast::Receiver<ChatEvent>,
}

impl Subscription {
    /// Next event for this user, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.concerns(&self.username) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("@{} lagged behind, skipped {skipped} events", self.username);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(a: &str, b: &str) -> ChatEvent {
        ChatEvent::ConversationStarted {
            conversation: format!("{a}:{b}"),
            participants: [a.to_owned(), b.to_owned()],
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_conversations() {
        let hub = Hub::new(8);
        let mut carol = hub.subscribe("carol");
        let mut bob = hub.subscribe("bob");

        hub.publish(started("alice", "bob"));
        hub.publish(ChatEvent::UnreadChanged {
            conversation: "alice:bob".to_owned(),
            username: "alice".to_owned(),
            count: 0,
        });
        hub.publish(started("bob", "carol"));

        assert_eq!(bob.next().await, Some(started("alice", "bob")));
        assert_eq!(bob.next().await, Some(started("bob", "carol")));
        assert_eq!(carol.next().await, Some(started("bob", "carol")));
    }

    #[tokio::test]
    async fn closed_hub_ends_subscription() {
        let hub = Hub::new(8);
        let mut sub = hub.subscribe("alice");
        drop(hub);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_going() {
        let hub = Hub::new(1);
        let mut sub = hub.subscribe("alice");
        hub.publish(started("alice", "bob"));
        hub.publish(started("alice", "carol"));
        assert_eq!(sub.next().await, Some(started("alice", "carol")));
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_value(started("alice", "bob")).unwrap();
        assert_eq!(json["type"], "conversation_started");
        assert_eq!(json["participants"][1], "bob");
    }
}
