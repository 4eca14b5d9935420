//! Column families of the consensus database
//!
//! Every family is keyed by `tip (32 bytes) ++ entity hash (32 bytes)`, so
//! entities of one tip sit next to each other.

use dpos_core::Hash;
use crate::{DbError, DbResult};

/// Length of a stored key
pub const KEY_LEN: usize = 64;

/// Column family names
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash)]
pub enum ColumnFamily {
    /// Candidate blocks (tip ++ block_hash -> ViceBlock)
    ViceBlocks,
    /// Round votes (tip ++ vote_hash -> RoundVoteP2p)
    RoundVotes,
    /// Transaction votes (tip ++ vote_hash -> TxVoteP2p)
    TxVotes,
}

impl ColumnFamily {
    /// Get the string name for this column family
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::ViceBlocks => "vice_blocks",
            ColumnFamily::RoundVotes => "round_votes",
            ColumnFamily::TxVotes => "tx_votes",
        }
    }

    /// Get all column families
    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::ViceBlocks,
            ColumnFamily::RoundVotes,
            ColumnFamily::TxVotes,
        ]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "vice_blocks" => Some(ColumnFamily::ViceBlocks),
            "round_votes" => Some(ColumnFamily::RoundVotes),
            "tx_votes" => Some(ColumnFamily::TxVotes),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build the storage key of an entity
pub fn entity_key(tip: &Hash, hash: &Hash) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..32].copy_from_slice(tip.as_bytes());
    key[32..].copy_from_slice(hash.as_bytes());
    key
}

/// Split a storage key into `(tip, hash)`
pub fn split_entity_key(key: &[u8]) -> DbResult<(Hash, Hash)> {
    if key.len() != KEY_LEN {
        return Err(DbError::InvalidKey(key.len()));
    }
    Ok((Hash::from_slice(&key[..32]), Hash::from_slice(&key[32..])))
}
