//! Transaction data structures

use crate::crypto::hash_encoded;
use crate::{CoreResult, Hash};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Reference to an output of a previous transaction
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, index: u32) -> Self {
        Self { txid, index }
    }
}

/// Transaction as seen by the consensus layer.
///
/// Contents beyond the spent inputs are opaque here; validity is decided by
/// the host's transaction validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    /// Format version
    pub version: u32,
    /// Outputs spent by this transaction
    pub inputs: Vec<OutPoint>,
    /// Opaque outputs and scripts
    pub payload: Vec<u8>,
    /// Earliest height or time the transaction may be included
    pub lock_time: u32,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(inputs: Vec<OutPoint>, payload: Vec<u8>) -> Self {
        Self {
            version: 1,
            inputs,
            payload,
            lock_time: 0,
        }
    }

    /// Transaction id (Keccak-256 of the canonical encoding)
    pub fn hash(&self) -> CoreResult<Hash> {
        hash_encoded(self)
    }

    /// Whether both transactions spend at least one common output
    pub fn conflicts_with(&self, other: &Transaction) -> bool {
        self.inputs
            .iter()
            .any(|input| other.inputs.contains(input))
    }
}

/// Transaction id wrapper defining the committed-transaction order.
///
/// All honest voters list committed transactions by this key, so blocks
/// assembled independently from the same committed set are identical. The
/// order is the lexicographic order of the 32 txid bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
pub struct TxIdSorted(pub Hash);

impl Ord for TxIdSorted {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for TxIdSorted {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Hash> for TxIdSorted {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}
