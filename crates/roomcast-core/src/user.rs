//! Users and the user registry.
//!
//! The registry owns all users, generates their identities, and is safe
//! to share across any number of concurrent callers.

use crate::error::{Entity, Error};
use crate::inbox::{Inbox, DEFAULT_INBOX_CAPACITY};
use crate::message::Message;
use crate::room::RoomId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Process-wide counter so IDs stay unique even within one nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a user.
///
/// Generated at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Generate a fresh, collision-free user ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("user_{timestamp:x}_{counter:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered user.
///
/// Owns two bounded mailboxes: the personal inbox receives room
/// broadcasts fanned out by dispatcher workers, the private inbox
/// receives direct messages. Each is drained by exactly one
/// transport-side consumer.
#[derive(Debug)]
pub struct User {
    id: UserId,
    display_name: RwLock<String>,
    /// The room the user currently belongs to, if any. At most one.
    room: RwLock<Option<RoomId>>,
    inbox: Inbox,
    private_inbox: Inbox,
}

impl User {
    fn new(id: UserId, display_name: String, inbox_capacity: usize) -> Self {
        Self {
            id,
            display_name: RwLock::new(display_name),
            room: RwLock::new(None),
            inbox: Inbox::with_capacity(inbox_capacity),
            private_inbox: Inbox::with_capacity(inbox_capacity),
        }
    }

    /// The user's identity.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Current display name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.display_name
            .read()
            .expect("display name lock poisoned")
            .clone()
    }

    pub(crate) fn set_display_name(&self, name: String) {
        *self
            .display_name
            .write()
            .expect("display name lock poisoned") = name;
    }

    /// The room the user currently belongs to, if any.
    #[must_use]
    pub fn current_room(&self) -> Option<RoomId> {
        self.room.read().expect("room lock poisoned").clone()
    }

    /// Atomically claim membership of `room` if the user is in no room.
    ///
    /// Returns the room the user already belongs to on failure, so the
    /// caller can name it in the conflict.
    pub(crate) fn try_enter_room(&self, room: &RoomId) -> Result<(), RoomId> {
        let mut guard = self.room.write().expect("room lock poisoned");
        match guard.as_ref() {
            Some(current) => Err(current.clone()),
            None => {
                *guard = Some(room.clone());
                Ok(())
            }
        }
    }

    /// Clear the current-room reference if it points at `room`.
    ///
    /// Returns whether anything was cleared.
    pub(crate) fn exit_room(&self, room: &RoomId) -> bool {
        let mut guard = self.room.write().expect("room lock poisoned");
        if guard.as_deref() == Some(room.as_str()) {
            *guard = None;
            true
        } else {
            false
        }
    }

    /// The personal inbox, written to by dispatcher workers.
    #[must_use]
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// The private inbox, written to by direct sends.
    #[must_use]
    pub fn private_inbox(&self) -> &Inbox {
        &self.private_inbox
    }

    /// Hand out the personal-inbox consumer end.
    ///
    /// `recv().await` yields messages in queue order and `None` once the
    /// user has been removed. A second call returns `None`; there is
    /// exactly one consumer per inbox.
    pub fn take_inbox(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbox.take_receiver()
    }

    /// Hand out the private-inbox consumer end. Same contract as
    /// [`User::take_inbox`].
    pub fn take_private_inbox(&self) -> Option<mpsc::Receiver<Message>> {
        self.private_inbox.take_receiver()
    }

    fn close_inboxes(&self) {
        self.inbox.close();
        self.private_inbox.close();
    }
}

/// Concurrency-safe registry of all users.
pub struct UserRegistry {
    /// Users indexed by identity.
    users: DashMap<UserId, Arc<User>>,
    /// Serializes creation so the uniqueness scan and the insert are one
    /// atomic step. Lookups and removals stay lock-free.
    create_lock: Mutex<()>,
    /// Capacity applied to each new user's inboxes.
    inbox_capacity: usize,
}

impl UserRegistry {
    /// Create a registry with the default inbox capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Create a registry whose users get inboxes of the given capacity.
    #[must_use]
    pub fn with_inbox_capacity(inbox_capacity: usize) -> Self {
        info!(inbox_capacity, "Creating user registry");
        Self {
            users: DashMap::new(),
            create_lock: Mutex::new(()),
            inbox_capacity,
        }
    }

    /// Register a new user under a freshly generated identity.
    ///
    /// Display names must be unique among current users at creation
    /// time; no invariant is maintained afterwards. The check and the
    /// insert are one atomic step: of two concurrent creators of the
    /// same name, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name, `Conflict` for a taken one.
    pub fn add_user(&self, display_name: &str) -> Result<Arc<User>, Error> {
        if display_name.is_empty() {
            return Err(Error::Validation("display name cannot be empty"));
        }

        let _creating = self.create_lock.lock().expect("create lock poisoned");
        if self
            .users
            .iter()
            .any(|entry| entry.display_name() == display_name)
        {
            return Err(Error::Conflict(format!(
                "display name already taken: {display_name}"
            )));
        }

        let id = UserId::generate();
        let user = Arc::new(User::new(
            id.clone(),
            display_name.to_string(),
            self.inbox_capacity,
        ));
        self.users.insert(id.clone(), Arc::clone(&user));

        debug!(user = %id, name = %display_name, "User registered");
        Ok(user)
    }

    /// Look up a user by ID.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub fn get(&self, id: &UserId) -> Result<Arc<User>, Error> {
        self.users
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(Entity::User, id.as_str()))
    }

    /// Change a user's display name in place.
    ///
    /// Uniqueness is not re-checked.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name, `NotFound` for a missing user.
    pub fn update_display_name(&self, id: &UserId, new_name: &str) -> Result<(), Error> {
        if new_name.is_empty() {
            return Err(Error::Validation("display name cannot be empty"));
        }
        let user = self.get(id)?;
        user.set_display_name(new_name.to_string());
        debug!(user = %id, name = %new_name, "Display name updated");
        Ok(())
    }

    /// Remove a user and close both inboxes, so any in-progress consumer
    /// observes end-of-stream.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub fn remove(&self, id: &UserId) -> Result<(), Error> {
        let (_, user) = self
            .users
            .remove(id)
            .ok_or_else(|| Error::not_found(Entity::User, id.as_str()))?;
        user.close_inboxes();
        debug!(user = %id, "User removed");
        Ok(())
    }

    /// Snapshot of all current users. An empty registry yields an empty
    /// vec, not an error.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<User>> {
        self.users
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the registry has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
