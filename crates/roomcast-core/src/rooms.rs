//! The room registry.
//!
//! Owns every live room, enforces name uniqueness with an atomic
//! check-and-insert, and gates deletion on the admin identity. Deletion
//! fires the room's cancellation signal exactly once, enforced here
//! by the single caller that wins the atomic remove, not by workers.

use crate::error::{Entity, Error};
use crate::room::{Room, RoomId, DEFAULT_ROOM_QUEUE_CAPACITY};
use crate::user::UserId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Concurrency-safe registry of all rooms, keyed by name.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
    /// Broadcast-queue capacity applied to each new room.
    queue_capacity: usize,
}

impl RoomRegistry {
    /// Create a registry with the default room queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_ROOM_QUEUE_CAPACITY)
    }

    /// Create a registry whose rooms get broadcast queues of the given
    /// capacity.
    #[must_use]
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        info!(queue_capacity, "Creating room registry");
        Self {
            rooms: DashMap::new(),
            queue_capacity,
        }
    }

    /// Create a room with empty membership and a fresh cancellation
    /// signal.
    ///
    /// The check-and-insert is atomic: of two concurrent creators of the
    /// same name, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name, `Conflict` if the name is taken.
    pub fn create(&self, name: &str, admin: UserId) -> Result<Arc<Room>, Error> {
        if name.is_empty() {
            return Err(Error::Validation("room name cannot be empty"));
        }

        match self.rooms.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!("room already exists: {name}"))),
            Entry::Vacant(slot) => {
                let room = Arc::new(Room::with_queue_capacity(name, admin, self.queue_capacity));
                slot.insert(Arc::clone(&room));
                debug!(room = %name, admin = %room.admin(), "Room created");
                Ok(room)
            }
        }
    }

    /// Look up a room by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the room does not exist.
    pub fn get(&self, name: &str) -> Result<Arc<Room>, Error> {
        self.rooms
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(Entity::Room, name))
    }

    /// Snapshot of all room names.
    #[must_use]
    pub fn list(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Delete a room, firing its cancellation signal.
    ///
    /// The room need not be empty; its workers stop when they observe
    /// the signal. Returns the removed room so a coordinating layer can
    /// clean up members' current-room references.
    ///
    /// # Errors
    ///
    /// `NotFound` if the room is absent (including when a concurrent
    /// delete won the race), `Forbidden` if `admin` is not the room's
    /// recorded admin.
    pub fn delete(&self, name: &str, admin: &UserId) -> Result<Arc<Room>, Error> {
        let room = self.get(name)?;
        if room.admin() != admin {
            return Err(Error::Forbidden(format!(
                "only the admin may delete room {name}"
            )));
        }

        // Remove only the instance we checked, so the signal fires once
        // per room even when deletes race with a re-create of the name.
        match self
            .rooms
            .remove_if(name, |_, current| Arc::ptr_eq(current, &room))
        {
            Some((_, removed)) => {
                removed.cancel();
                info!(room = %name, admin = %admin, "Room deleted");
                Ok(removed)
            }
            None => Err(Error::not_found(Entity::Room, name)),
        }
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the registry has no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_list() {
        let registry = RoomRegistry::new();
        let room = registry.create("general", UserId::from("user_a")).unwrap();
        assert_eq!(room.name(), "general");

        assert_eq!(registry.get("general").unwrap().name(), "general");
        assert!(registry
            .get("nowhere")
            .unwrap_err()
            .is_not_found(Entity::Room));

        registry.create("random", UserId::from("user_b")).unwrap();
        let mut names = registry.list();
        names.sort();
        assert_eq!(names, vec!["general", "random"]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = RoomRegistry::new();
        assert!(matches!(
            registry.create("", UserId::from("user_a")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let registry = RoomRegistry::new();
        registry.create("general", UserId::from("user_a")).unwrap();
        assert!(matches!(
            registry.create("general", UserId::from("user_b")),
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_same_name_creation() {
        let registry = Arc::new(RoomRegistry::new());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.create("general", UserId::from(format!("user_{i}")))
                })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(Error::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_names_all_succeed() {
        let registry = Arc::new(RoomRegistry::new());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.create(&format!("room-{i}"), UserId::from("user_a"))
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(registry.len(), 16);
    }

    #[test]
    fn test_delete_requires_admin() {
        let registry = RoomRegistry::new();
        let admin = UserId::from("user_admin");
        registry.create("general", admin.clone()).unwrap();

        assert!(matches!(
            registry.delete("general", &UserId::from("user_other")),
            Err(Error::Forbidden(_))
        ));

        let removed = registry.delete("general", &admin).unwrap();
        assert!(removed.is_cancelled());
        assert!(registry
            .get("general")
            .unwrap_err()
            .is_not_found(Entity::Room));

        // A second delete finds nothing.
        assert!(registry
            .delete("general", &admin)
            .unwrap_err()
            .is_not_found(Entity::Room));
    }

    #[test]
    fn test_delete_with_members_still_works() {
        let registry = RoomRegistry::new();
        let admin = UserId::from("user_admin");
        let room = registry.create("general", admin.clone()).unwrap();
        room.add_member(crate::room::MemberInfo {
            user_id: UserId::from("user_b"),
            display_name: "bob".to_string(),
        });

        registry.delete("general", &admin).unwrap();
        assert!(registry.is_empty());
    }
}
