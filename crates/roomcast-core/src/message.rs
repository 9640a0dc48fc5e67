//! Message value type.
//!
//! Messages are immutable once constructed. Each enqueue clones the
//! message into exactly one destination queue; a broadcast fans out N
//! independent copies, one per member.

use crate::room::RoomId;
use crate::user::UserId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
///
/// Timestamps are assigned at dispatch time, not at display time.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A routed chat message.
///
/// The sender is stored as an identity; display names are resolved at
/// delivery time by whoever renders the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identity of the sending user.
    pub sender: UserId,
    /// Target user, set for private messages only.
    pub receiver: Option<UserId>,
    /// Target room, set for broadcast messages only.
    pub room: Option<RoomId>,
    /// Opaque message text.
    pub content: String,
    /// Milliseconds since the Unix epoch, assigned at dispatch.
    pub timestamp: u64,
}

impl Message {
    /// Create a broadcast message addressed to a room.
    #[must_use]
    pub fn broadcast(sender: UserId, room: impl Into<RoomId>, content: impl Into<String>) -> Self {
        Self {
            sender,
            receiver: None,
            room: Some(room.into()),
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    /// Create a private message addressed to a single user.
    #[must_use]
    pub fn private(sender: UserId, receiver: UserId, content: impl Into<String>) -> Self {
        Self {
            sender,
            receiver: Some(receiver),
            room: None,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    /// Whether this is a private (direct) message.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.receiver.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_message() {
        let msg = Message::broadcast(UserId::from("user_a"), "general", "hi");
        assert_eq!(msg.room.as_deref(), Some("general"));
        assert!(msg.receiver.is_none());
        assert!(!msg.is_private());
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_private_message() {
        let msg = Message::private(UserId::from("user_a"), UserId::from("user_b"), "psst");
        assert!(msg.room.is_none());
        assert_eq!(msg.receiver, Some(UserId::from("user_b")));
        assert!(msg.is_private());
    }
}
