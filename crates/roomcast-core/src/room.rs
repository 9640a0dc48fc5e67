//! Rooms: membership plus a bounded broadcast mailbox.
//!
//! A room owns the set of current members and the inbound queue that
//! dispatcher workers drain. Deletion is signalled through a write-once
//! cancellation value observed by every worker; the message queue itself
//! is never closed by producers.

use crate::message::Message;
use crate::user::UserId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// A room identifier. Rooms are keyed by their name.
pub type RoomId = String;

/// Default capacity of a room's inbound broadcast queue.
pub const DEFAULT_ROOM_QUEUE_CAPACITY: usize = 1000;

/// Membership record: the user's identity plus a display-name snapshot
/// taken at join time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Identity of the member.
    pub user_id: UserId,
    /// Display name as it was when the user joined.
    pub display_name: String,
}

/// A chat room.
#[derive(Debug)]
pub struct Room {
    /// Room name, unique in the registry.
    name: RoomId,
    /// The creator; fixed for the room's lifetime, sole delete authority.
    admin: UserId,
    /// Current members, keyed by user identity.
    members: DashMap<UserId, MemberInfo>,
    /// Producer end of the inbound broadcast queue.
    queue_tx: mpsc::Sender<Message>,
    /// Consumer end, taken exactly once by the room's worker pool.
    queue_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    /// Write-once cancellation signal, fired by the registry at deletion.
    cancel: watch::Sender<bool>,
}

impl Room {
    /// Create a room with the default queue capacity.
    #[must_use]
    pub fn new(name: impl Into<RoomId>, admin: UserId) -> Self {
        Self::with_queue_capacity(name, admin, DEFAULT_ROOM_QUEUE_CAPACITY)
    }

    /// Create a room whose broadcast queue holds at most `capacity`
    /// undelivered messages.
    #[must_use]
    pub fn with_queue_capacity(name: impl Into<RoomId>, admin: UserId, capacity: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (cancel, _) = watch::channel(false);
        Self {
            name: name.into(),
            admin,
            members: DashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            cancel,
        }
    }

    /// The room's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the room's admin.
    #[must_use]
    pub fn admin(&self) -> &UserId {
        &self.admin
    }

    /// Store a membership record. The coordinating layer has already
    /// checked that the user is not a member anywhere.
    pub fn add_member(&self, member: MemberInfo) {
        debug!(room = %self.name, user = %member.user_id, "Member added");
        self.members.insert(member.user_id.clone(), member);
    }

    /// Remove a membership record. Removing an absent member is a no-op.
    ///
    /// Returns whether the user was a member.
    pub fn remove_member(&self, user_id: &UserId) -> bool {
        let removed = self.members.remove(user_id).is_some();
        if removed {
            debug!(room = %self.name, user = %user_id, "Member removed");
        }
        removed
    }

    /// Whether the user is currently a member.
    #[must_use]
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }

    /// Point-in-time membership snapshot.
    ///
    /// Iteration may race with concurrent joins and leaves; callers get
    /// weak (snapshot) consistency.
    #[must_use]
    pub fn members(&self) -> Vec<MemberInfo> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of current members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Enqueue a broadcast message without blocking.
    ///
    /// Returns whether the message was queued. A saturated queue drops
    /// the message; a cancelled room no-ops, so no sender ever blocks
    /// against a stopped room.
    pub fn try_broadcast(&self, message: Message) -> bool {
        if self.is_cancelled() {
            trace!(room = %self.name, "Broadcast to cancelled room ignored");
            return false;
        }
        match self.queue_tx.try_send(message) {
            Ok(()) => {
                trace!(room = %self.name, "Broadcast queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(room = %self.name, "Broadcast queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Workers have exited and dropped the receiver.
                trace!(room = %self.name, "Broadcast queue closed, message dropped");
                false
            }
        }
    }

    /// Hand the queue's consumer end to the room's worker pool.
    ///
    /// Returns `None` if the pool already took it.
    pub(crate) fn take_queue_receiver(&self) -> Option<mpsc::Receiver<Message>> {
        self.queue_rx
            .lock()
            .expect("room queue lock poisoned")
            .take()
    }

    /// A receiver on the cancellation signal, one per worker.
    #[must_use]
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Fire the cancellation signal.
    ///
    /// The registry guarantees this is called exactly once, by the one
    /// caller that atomically removed the room; a second firing is a
    /// programming error.
    pub(crate) fn cancel(&self) {
        let already_fired = self.cancel.send_replace(true);
        debug_assert!(!already_fired, "room cancellation fired twice");
        debug!(room = %self.name, "Room cancelled");
    }

    /// Whether the cancellation signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str) -> MemberInfo {
        MemberInfo {
            user_id: UserId::from(id),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_membership() {
        let room = Room::new("general", UserId::from("user_admin"));
        assert_eq!(room.member_count(), 0);

        room.add_member(member("user_a", "alice"));
        room.add_member(member("user_b", "bob"));
        assert_eq!(room.member_count(), 2);
        assert!(room.is_member(&UserId::from("user_a")));

        assert!(room.remove_member(&UserId::from("user_a")));
        assert!(!room.is_member(&UserId::from("user_a")));

        // Removing an absent member is a no-op, not an error.
        assert!(!room.remove_member(&UserId::from("user_a")));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_members_snapshot() {
        let room = Room::new("general", UserId::from("user_admin"));
        room.add_member(member("user_a", "alice"));
        room.add_member(member("user_b", "bob"));

        let snapshot = room.members();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|m| m.display_name == "alice"));
    }

    #[tokio::test]
    async fn test_broadcast_queue_drops_when_full() {
        let admin = UserId::from("user_admin");
        let room = Room::with_queue_capacity("general", admin.clone(), 1);

        assert!(room.try_broadcast(Message::broadcast(admin.clone(), "general", "first")));
        // Queue is saturated; the second message is dropped, not blocked on.
        assert!(!room.try_broadcast(Message::broadcast(admin.clone(), "general", "second")));

        let mut rx = room.take_queue_receiver().unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "first");
    }

    #[test]
    fn test_cancelled_room_refuses_broadcasts() {
        let admin = UserId::from("user_admin");
        let room = Room::new("general", admin.clone());
        assert!(!room.is_cancelled());

        room.cancel();
        assert!(room.is_cancelled());
        assert!(!room.try_broadcast(Message::broadcast(admin, "general", "too late")));
    }

    #[tokio::test]
    async fn test_cancellation_observed_by_many() {
        let room = Room::new("general", UserId::from("user_admin"));
        let mut first = room.cancellation();
        let mut second = room.cancellation();

        room.cancel();
        first.wait_for(|stop| *stop).await.unwrap();
        second.wait_for(|stop| *stop).await.unwrap();
    }

    #[test]
    fn test_queue_receiver_taken_once() {
        let room = Room::new("general", UserId::from("user_admin"));
        assert!(room.take_queue_receiver().is_some());
        assert!(room.take_queue_receiver().is_none());
    }
}
