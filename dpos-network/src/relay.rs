//! Relay cache of recently announced consensus payloads
//!
//! Every payload this node announces is kept here, encoded, until it expires,
//! so peers answering the announcement with `GetData` can be served.

use crate::{DposMessage, Inventory, NetworkResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default time a relayed payload stays available
pub const DEFAULT_RELAY_EXPIRY: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct RelayEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// Encoded payloads keyed by (kind, hash)
#[derive(Debug)]
pub struct RelayCache {
    entries: Mutex<HashMap<Inventory, RelayEntry>>,
    expiry: Duration,
}

impl RelayCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Encode and store `message` under `inventory`
    pub fn insert(&self, inventory: Inventory, message: &DposMessage) -> NetworkResult<()> {
        let payload = message.encode()?;
        self.insert_at(inventory, payload, Instant::now());
        Ok(())
    }

    /// Store raw payload bytes; expired entries are swept first
    pub fn insert_at(&self, inventory: Inventory, payload: Vec<u8>, now: Instant) {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            inventory,
            RelayEntry {
                payload,
                expires_at: now + self.expiry,
            },
        );
    }

    /// Encoded payload, if present and not expired
    pub fn get(&self, inventory: &Inventory) -> Option<Vec<u8>> {
        self.get_at(inventory, Instant::now())
    }

    pub fn get_at(&self, inventory: &Inventory, now: Instant) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        entries
            .get(inventory)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone())
    }

    /// Decoded message, if present and not expired
    pub fn get_message(&self, inventory: &Inventory) -> NetworkResult<Option<DposMessage>> {
        match self.get(inventory) {
            Some(bytes) => Ok(Some(DposMessage::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, inventory: &Inventory) -> bool {
        self.get(inventory).is_some()
    }

    /// Number of stored entries, including ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for RelayCache {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_EXPIRY)
    }
}
