//! Account storage the login gate authenticates against.
//!
//! Profiles are kept as bincode records so a store can hand them to any
//! backing medium. Only the in-memory store lives here.

use crate::error::AccountError;
use crate::transform::Position;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Where new accounts start.
pub const SPAWN_POSITION: Position = Position {
    x: 3222,
    y: 3218,
    z: 0,
};

pub const DEFAULT_HITPOINTS: u8 = 10;

/// Body looks sent in the appearance update block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    pub gender: u8,
    pub head_icon: i8,
    pub body: [u16; 7],
    pub colors: [u8; 5],
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            gender: 0,
            head_icon: -1,
            body: [0, 10, 18, 26, 33, 36, 42],
            colors: [0; 5],
        }
    }
}

/// Everything persisted about a player between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub username: String,
    pub rights: u8,
    pub position: Position,
    pub appearance: Appearance,
    pub hitpoints: u8,
}

impl PlayerProfile {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_owned(),
            rights: 0,
            position: SPAWN_POSITION,
            appearance: Appearance::default(),
            hitpoints: DEFAULT_HITPOINTS,
        }
    }
}

/// Account lookups made by the login gate and saves made after logout.
///
/// Implementations may block; callers on the tick thread hand saves off to a
/// blocking task.
pub trait AccountStore: Send + Sync {
    fn exists(&self, username: &str) -> bool;

    fn is_valid_password(&self, username: &str, password: &str) -> bool;

    fn load(&self, username: &str) -> Result<PlayerProfile, AccountError>;

    /// Creates an account and returns its fresh profile.
    fn create(&self, username: &str, password: &str) -> Result<PlayerProfile, AccountError>;

    fn save(&self, profile: &PlayerProfile) -> Result<(), AccountError>;
}

#[derive(Debug, Clone)]
struct AccountRecord {
    salt: [u8; 8],
    digest: Vec<u8>,
    profile: Vec<u8>,
}

fn password_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Keeps accounts in a map for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: RwLock<HashMap<String, AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw profile record, bypassing encoding.
    pub fn insert_record(&self, username: &str, password: &str, profile: Vec<u8>) {
        let mut salt = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut salt);
        let record = AccountRecord {
            salt,
            digest: password_digest(&salt, password),
            profile,
        };
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(username.to_owned(), record);
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_profile(profile: &PlayerProfile) -> Result<Vec<u8>, AccountError> {
    bincode::serialize(profile).map_err(|err| AccountError::Corrupt {
        username: profile.username.clone(),
        reason: err.to_string(),
    })
}

impl AccountStore for MemoryAccountStore {
    fn exists(&self, username: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(username)
    }

    fn is_valid_password(&self, username: &str, password: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(username)
            .map(|record| record.digest == password_digest(&record.salt, password))
            .unwrap_or(false)
    }

    fn load(&self, username: &str) -> Result<PlayerProfile, AccountError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get(username)
            .ok_or_else(|| AccountError::NotFound(username.to_owned()))?;
        bincode::deserialize(&record.profile).map_err(|err| AccountError::Corrupt {
            username: username.to_owned(),
            reason: err.to_string(),
        })
    }

    fn create(&self, username: &str, password: &str) -> Result<PlayerProfile, AccountError> {
        let profile = PlayerProfile::new(username);
        self.insert_record(username, password, encode_profile(&profile)?);
        Ok(profile)
    }

    fn save(&self, profile: &PlayerProfile) -> Result<(), AccountError> {
        let encoded = encode_profile(profile)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(&profile.username)
            .ok_or_else(|| AccountError::NotFound(profile.username.clone()))?;
        record.profile = encoded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_load() {
        let store = MemoryAccountStore::new();
        let created = store.create("alice", "hunter2").unwrap();
        assert_eq!(created.position, SPAWN_POSITION);
        assert_eq!(store.load("alice").unwrap(), created);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_password_check() {
        let store = MemoryAccountStore::new();
        store.create("alice", "hunter2").unwrap();
        assert!(store.is_valid_password("alice", "hunter2"));
        assert!(!store.is_valid_password("alice", "hunter3"));
        assert!(!store.is_valid_password("bob", "hunter2"));
    }

    #[test]
    fn test_save_persists_position() {
        let store = MemoryAccountStore::new();
        let mut profile = store.create("alice", "pw").unwrap();
        profile.position = Position::new(3100, 3300, 1);
        store.save(&profile).unwrap();
        assert_eq!(store.load("alice").unwrap().position, Position::new(3100, 3300, 1));
    }

    #[test]
    fn test_save_unknown_account() {
        let store = MemoryAccountStore::new();
        let profile = PlayerProfile::new("ghost");
        assert_eq!(
            store.save(&profile),
            Err(AccountError::NotFound("ghost".to_owned()))
        );
    }

    #[test]
    fn test_corrupt_record() {
        let store = MemoryAccountStore::new();
        store.insert_record("broken", "pw", vec![1, 2]);
        assert!(store.exists("broken"));
        assert!(matches!(
            store.load("broken"),
            Err(AccountError::Corrupt { .. })
        ));
    }
}
