//! Server-side identity store: `userid → Ed25519 public key`.
//!
//! No passwords are ever transmitted or stored. The table is read-mostly
//! and single-writer, so it sits behind an `RwLock`; lookups clone the key
//! (32 bytes) and tolerate entries going stale mid-handshake.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::VerifyingKey;

use hackvr_protocol::UserId;

#[derive(Debug, Default)]
pub struct IdentityStore {
    keys: RwLock<HashMap<UserId, VerifyingKey>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserId, key: VerifyingKey) {
        self.keys.write().expect("identity lock").insert(user, key);
    }

    pub fn remove(&self, user: &UserId) -> bool {
        self.keys.write().expect("identity lock").remove(user).is_some()
    }

    pub fn lookup(&self, user: &UserId) -> Option<VerifyingKey> {
        self.keys.read().expect("identity lock").get(user).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.read().expect("identity lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
