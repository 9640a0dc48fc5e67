//! Message dispatch: validation, routing, and per-room worker pools.
//!
//! The dispatcher sits between the transport layer and the registries.
//! It validates senders and receivers, pushes broadcasts onto room
//! queues and private messages onto receiver inboxes, and runs a
//! fixed-size pool of workers per room that fans queued broadcasts out
//! to every member's personal inbox.
//!
//! Delivery is best-effort throughout: enqueues never block, and a
//! saturated queue loses the message rather than stalling a publisher.
//! Broadcast drops are invisible to the sender; a private drop is
//! reported as [`Error::QueueFull`] because there is exactly one
//! recipient and the caller can retry.

use crate::error::{Entity, Error};
use crate::inbox::PushError;
use crate::message::Message;
use crate::room::{MemberInfo, Room};
use crate::rooms::RoomRegistry;
use crate::user::{UserId, UserRegistry};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Default number of workers in a room's dispatch pool.
const DEFAULT_WORKERS_PER_ROOM: usize = 5;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed size of each room's worker pool.
    pub workers_per_room: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers_per_room: DEFAULT_WORKERS_PER_ROOM,
        }
    }
}

/// Handle to a running room dispatch pool.
///
/// The pool's lifecycle is `Dispatching` while workers run, `Cancelling`
/// once the room's signal fires, and `Stopped` when every worker has
/// observed it and exited, which is when [`DispatcherHandle::stopped`]
/// resolves.
pub struct DispatcherHandle {
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Number of workers in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait until every worker has exited.
    pub async fn stopped(self) {
        for worker in self.workers {
            // Workers never panic on expected conditions; a join error
            // would mean the runtime aborted them.
            let _ = worker.await;
        }
    }
}

/// Routes messages between senders, rooms, and recipient inboxes.
pub struct MessageDispatcher {
    users: Arc<UserRegistry>,
    rooms: Arc<RoomRegistry>,
    config: DispatcherConfig,
}

impl MessageDispatcher {
    /// Create a dispatcher over the given registries with the default
    /// pool size.
    #[must_use]
    pub fn new(users: Arc<UserRegistry>, rooms: Arc<RoomRegistry>) -> Self {
        Self::with_config(users, rooms, DispatcherConfig::default())
    }

    /// Create a dispatcher with a custom configuration.
    #[must_use]
    pub fn with_config(
        users: Arc<UserRegistry>,
        rooms: Arc<RoomRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        info!(workers_per_room = config.workers_per_room, "Creating dispatcher");
        Self {
            users,
            rooms,
            config,
        }
    }

    /// The user registry this dispatcher validates against.
    #[must_use]
    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    /// The room registry this dispatcher routes through.
    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Broadcast a message to a room.
    ///
    /// The message is stamped and enqueued onto the room's broadcast
    /// queue without blocking. A saturated queue drops the message and
    /// the call still succeeds: broadcast is an at-most-once, best-effort
    /// contract.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing room or sender, `Validation` for empty
    /// content.
    pub fn broadcast(&self, room_id: &str, sender_id: &UserId, content: &str) -> Result<(), Error> {
        if content.is_empty() {
            return Err(Error::Validation("message content cannot be empty"));
        }
        let room = self.rooms.get(room_id)?;
        let sender = self
            .users
            .get(sender_id)
            .map_err(|_| Error::not_found(Entity::Sender, sender_id.as_str()))?;

        let message = Message::broadcast(sender.id().clone(), room.name(), content);
        let queued = room.try_broadcast(message);
        trace!(room = %room_id, sender = %sender_id, queued, "Broadcast submitted");
        Ok(())
    }

    /// Send a private message to a single user.
    ///
    /// # Errors
    ///
    /// `NotFound` naming the missing side, `Validation` for empty
    /// content, `QueueFull` if the receiver's private inbox is
    /// saturated.
    pub fn send_private(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> Result<(), Error> {
        if content.is_empty() {
            return Err(Error::Validation("message content cannot be empty"));
        }
        let sender = self
            .users
            .get(sender_id)
            .map_err(|_| Error::not_found(Entity::Sender, sender_id.as_str()))?;
        let receiver = self
            .users
            .get(receiver_id)
            .map_err(|_| Error::not_found(Entity::Receiver, receiver_id.as_str()))?;

        let message = Message::private(sender.id().clone(), receiver.id().clone(), content);
        match receiver.private_inbox().try_push(message) {
            Ok(()) => {
                trace!(sender = %sender_id, receiver = %receiver_id, "Private message queued");
                Ok(())
            }
            Err(PushError::Full) => Err(Error::QueueFull {
                user: receiver_id.clone(),
            }),
            // The receiver was removed between lookup and push.
            Err(PushError::Closed) => {
                Err(Error::not_found(Entity::Receiver, receiver_id.as_str()))
            }
        }
    }

    /// Add a user to a room.
    ///
    /// Stores a membership record with a display-name snapshot taken at
    /// join time and sets the user's current-room reference.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing room or user, `Conflict` if the user
    /// already belongs to any room (including this one).
    pub fn join_room(&self, room_id: &str, user_id: &UserId) -> Result<(), Error> {
        let room = self.rooms.get(room_id)?;
        let user = self.users.get(user_id)?;

        let room_name: String = room.name().to_string();
        if let Err(current) = user.try_enter_room(&room_name) {
            return Err(Error::Conflict(format!(
                "user {user_id} already in room {current}"
            )));
        }
        room.add_member(MemberInfo {
            user_id: user.id().clone(),
            display_name: user.display_name(),
        });
        debug!(room = %room_id, user = %user_id, "User joined room");
        Ok(())
    }

    /// Remove a user from a room.
    ///
    /// Removing a user who is not a member is a no-op, not an error.
    /// If the room no longer exists but the user still points at it,
    /// the stale current-room reference is cleared and the call
    /// succeeds, so a user cannot get stuck in a deleted room.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing room or user.
    pub fn leave_room(&self, room_id: &str, user_id: &UserId) -> Result<(), Error> {
        let user = self.users.get(user_id)?;
        match self.rooms.get(room_id) {
            Ok(room) => {
                room.remove_member(user_id);
                user.exit_room(&room.name().to_string());
                debug!(room = %room_id, user = %user_id, "User left room");
                Ok(())
            }
            Err(err) => {
                if user.exit_room(&room_id.to_string()) {
                    debug!(room = %room_id, user = %user_id, "Cleared stale room reference");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Point-in-time membership snapshot of a room.
    ///
    /// # Errors
    ///
    /// `NotFound` if the room does not exist.
    pub fn list_members(&self, room_id: &str) -> Result<Vec<MemberInfo>, Error> {
        Ok(self.rooms.get(room_id)?.members())
    }

    /// Remove a user entirely: leave the current room, if any, then drop
    /// the registration and close both inboxes.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub fn disconnect_user(&self, user_id: &UserId) -> Result<(), Error> {
        let user = self.users.get(user_id)?;
        if let Some(room_id) = user.current_room() {
            if let Ok(room) = self.rooms.get(&room_id) {
                room.remove_member(user_id);
            }
            user.exit_room(&room_id);
        }
        self.users.remove(user_id)?;
        debug!(user = %user_id, "User disconnected");
        Ok(())
    }

    /// Delete a room and release its members.
    ///
    /// After the registry delete, every member's current-room reference
    /// is cleared so users are free to join elsewhere.
    ///
    /// # Errors
    ///
    /// `NotFound` if the room is absent, `Forbidden` if `admin` is not
    /// the room's recorded admin.
    pub fn delete_room(&self, room_id: &str, admin: &UserId) -> Result<(), Error> {
        let removed = self.rooms.delete(room_id, admin)?;
        for member in removed.members() {
            if let Ok(user) = self.users.get(&member.user_id) {
                user.exit_room(&removed.name().to_string());
            }
        }
        Ok(())
    }

    /// Start the fixed-size worker pool that drains a room's broadcast
    /// queue and fans each message out to the members' personal inboxes.
    ///
    /// Workers are symmetric and interchangeable; each waits on either
    /// the next queued message or the room's cancellation signal and
    /// exits when the signal fires.
    ///
    /// # Errors
    ///
    /// `NotFound` if the room does not exist, `Conflict` if a pool is
    /// already running for it.
    pub fn start_room_dispatcher(&self, room_id: &str) -> Result<DispatcherHandle, Error> {
        let room = self.rooms.get(room_id)?;
        let queue = room.take_queue_receiver().ok_or_else(|| {
            Error::Conflict(format!("dispatcher already running for room {room_id}"))
        })?;
        let queue = Arc::new(Mutex::new(queue));

        let workers = (0..self.config.workers_per_room)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&room),
                    Arc::clone(&self.users),
                    Arc::clone(&queue),
                    room.cancellation(),
                ))
            })
            .collect::<Vec<_>>();

        info!(room = %room_id, workers = workers.len(), "Room dispatcher started");
        Ok(DispatcherHandle { workers })
    }
}

/// One dispatch worker: drain the shared queue until cancellation.
async fn run_worker(
    worker: usize,
    room: Arc<Room>,
    users: Arc<UserRegistry>,
    queue: Arc<Mutex<mpsc::Receiver<Message>>>,
    mut cancel: watch::Receiver<bool>,
) {
    debug!(room = %room.name(), worker, "Dispatch worker started");
    loop {
        let message = tokio::select! {
            // Resolves as soon as the signal fires, even if it fired
            // before this worker subscribed; an Err means the room was
            // dropped outright, which also means stop.
            _ = cancel.wait_for(|stop| *stop) => break,
            message = async { queue.lock().await.recv().await } => message,
        };
        match message {
            Some(message) => fan_out(&room, &users, &message),
            // All queue senders are gone.
            None => break,
        }
    }
    debug!(room = %room.name(), worker, "Dispatch worker stopped");
}

/// Deliver one dequeued broadcast to every current member.
///
/// The whole fan-out is a single unit of work by the worker that
/// dequeued the message; membership is a point-in-time snapshot that may
/// race with joins and leaves.
fn fan_out(room: &Room, users: &UserRegistry, message: &Message) {
    let members = room.members();
    trace!(room = %room.name(), recipients = members.len(), "Fanning out broadcast");
    for member in members {
        match users.get(&member.user_id) {
            Ok(user) => {
                if let Err(reason) = user.inbox().try_push(message.clone()) {
                    trace!(
                        room = %room.name(),
                        user = %member.user_id,
                        ?reason,
                        "Broadcast delivery dropped"
                    );
                }
            }
            // Member was removed from the registry but not yet from the
            // room; skip.
            Err(_) => trace!(
                room = %room.name(),
                user = %member.user_id,
                "Member no longer registered, skipping"
            ),
        }
    }
}
