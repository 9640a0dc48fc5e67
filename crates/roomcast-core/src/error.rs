//! Error types shared by the roomcast core.
//!
//! Every public operation returns one of these kinds or succeeds. The
//! transport layer is responsible for mapping kinds to wire responses;
//! the core's contract is the kind itself.

use crate::user::UserId;
use std::fmt;
use thiserror::Error;

/// Which kind of entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A user looked up by ID.
    User,
    /// A room looked up by name.
    Room,
    /// The sending side of a private message.
    Sender,
    /// The receiving side of a private message.
    Receiver,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Entity::User => "user",
            Entity::Room => "room",
            Entity::Sender => "sender",
            Entity::Receiver => "receiver",
        };
        f.write_str(s)
    }
}

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was empty or malformed.
    #[error("invalid input: {0}")]
    Validation(&'static str),

    /// A user or room was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Which side of the operation was missing.
        entity: Entity,
        /// The identity that failed to resolve.
        id: String,
    },

    /// Duplicate room name, duplicate display name, or a user already
    /// belonging to a room.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Room deletion attempted by someone other than the room's admin.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A private message could not be delivered because the receiver's
    /// queue was saturated.
    #[error("message queue full for user {user}")]
    QueueFull {
        /// The receiver whose queue rejected the message.
        user: UserId,
    },
}

impl Error {
    /// Build a [`Error::NotFound`] for the given entity and identity.
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether this error is a [`Error::NotFound`] for the given entity.
    #[must_use]
    pub fn is_not_found(&self, wanted: Entity) -> bool {
        matches!(self, Error::NotFound { entity, .. } if *entity == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found(Entity::Room, "general");
        assert_eq!(err.to_string(), "room not found: general");
        assert!(err.is_not_found(Entity::Room));
        assert!(!err.is_not_found(Entity::User));
    }

    #[test]
    fn test_queue_full_display() {
        let err = Error::QueueFull {
            user: UserId::from("user_1"),
        };
        assert_eq!(err.to_string(), "message queue full for user user_1");
    }
}
