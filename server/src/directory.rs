//! Who is logged in, as seen from outside the tick loop.
//!
//! The tick loop owns every entity, so the login gate can't look at them
//! directly. Instead the tick loop publishes a small presence record per
//! player here, and the gate reserves a name before handing a new login over
//! so two simultaneous logins for one account can't both succeed.

use crate::entity::EntityId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Presence of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    /// `None` while a login is in flight to the tick loop.
    pub entity: Option<EntityId>,
    /// Client instance id of the network binding, if the entity has one.
    pub signlink: Option<i32>,
}

/// Why a name could not be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    Taken,
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    players: Arc<RwLock<HashMap<String, Presence>>>,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Players in the world plus logins in flight.
    pub fn len(&self) -> usize {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, username: &str) -> Option<Presence> {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .copied()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    /// Claims `username` for a login in flight, as long as fewer than
    /// `capacity` players are present or in flight.
    pub fn try_reserve(&self, username: &str, capacity: usize) -> Result<(), ReserveError> {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if players.contains_key(username) {
            return Err(ReserveError::Taken);
        }
        if players.len() >= capacity {
            return Err(ReserveError::Full);
        }
        players.insert(
            username.to_owned(),
            Presence {
                entity: None,
                signlink: None,
            },
        );
        Ok(())
    }

    /// Records the entity and binding a login ended up with.
    pub fn bind(&self, username: &str, entity: EntityId, signlink: Option<i32>) {
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                username.to_owned(),
                Presence {
                    entity: Some(entity),
                    signlink,
                },
            );
    }

    /// Drops `username` only while it still points at `entity`, so a newer
    /// login for the same account is left alone.
    pub fn remove_entity(&self, username: &str, entity: EntityId) -> bool {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        let owned = players
            .get(username)
            .map_or(false, |presence| presence.entity == Some(entity));
        if owned {
            players.remove(username);
        }
        owned
    }

    pub fn remove(&self, username: &str) -> Option<Presence> {
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_blocks_second_login() {
        let directory = PlayerDirectory::new();
        assert_eq!(directory.try_reserve("alice", 10), Ok(()));
        assert_eq!(directory.try_reserve("alice", 10), Err(ReserveError::Taken));
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("alice").unwrap().entity, None);
    }

    #[test]
    fn test_bind_replaces_reservation() {
        let directory = PlayerDirectory::new();
        directory.try_reserve("alice", 10).unwrap();
        directory.bind("alice", EntityId(7), Some(99));
        let presence = directory.get("alice").unwrap();
        assert_eq!(presence.entity, Some(EntityId(7)));
        assert_eq!(presence.signlink, Some(99));
    }

    #[test]
    fn test_reservation_respects_capacity() {
        let directory = PlayerDirectory::new();
        directory.bind("bob", EntityId(1), None);
        assert_eq!(directory.try_reserve("alice", 2), Ok(()));
        assert_eq!(directory.try_reserve("carol", 2), Err(ReserveError::Full));
        assert!(!directory.contains("carol"));
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_capacity() {
        let directory = PlayerDirectory::new();
        let handles: Vec<_> = (0..16)
            .map(|n| {
                let directory = directory.clone();
                std::thread::spawn(move || directory.try_reserve(&format!("player{}", n), 5).is_ok())
            })
            .collect();
        let reserved = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(reserved, 5);
        assert_eq!(directory.len(), 5);
    }

    #[test]
    fn test_clones_share_state() {
        let directory = PlayerDirectory::new();
        let gate_view = directory.clone();
        directory.bind("bob", EntityId(1), None);
        assert!(gate_view.contains("bob"));
        gate_view.remove("bob");
        assert!(directory.is_empty());
    }

    #[test]
    fn test_remove_entity_ignores_newer_login() {
        let directory = PlayerDirectory::new();
        directory.bind("alice", EntityId(2), Some(1));
        assert!(!directory.remove_entity("alice", EntityId(1)));
        assert!(directory.contains("alice"));
        assert!(directory.remove_entity("alice", EntityId(2)));
        assert!(!directory.contains("alice"));
    }
}
