//! Block data structures

use crate::crypto::{hash_encoded, keccak256};
use crate::{BlockNumber, CoreResult, Hash, Round, Timestamp, Transaction};
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    /// Hash of the parent block (the tip a vice block competes to extend)
    pub parent_hash: Hash,
    /// Block number (height)
    pub number: BlockNumber,
    /// dPoS voting round the block was proposed in
    pub round: Round,
    /// Root hash of the transaction list
    pub transactions_root: Hash,
    /// Block timestamp in milliseconds
    pub timestamp: Timestamp,
    /// Extra data (arbitrary bytes)
    pub extra_data: Vec<u8>,
    /// Proof-of-work nonce
    pub nonce: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header
    pub fn hash(&self) -> CoreResult<Hash> {
        hash_encoded(self)
    }
}

/// Complete block with header and transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions
    pub transactions: Vec<Transaction>,
}

/// Candidate block proposed to the dPoS team for ratification
pub type ViceBlock = Block;

impl Block {
    /// Create a new block on top of `parent_hash`, filling in the transactions root
    pub fn new(
        parent_hash: Hash,
        number: BlockNumber,
        round: Round,
        timestamp: Timestamp,
        transactions: Vec<Transaction>,
    ) -> CoreResult<Self> {
        let mut block = Self {
            header: BlockHeader {
                parent_hash,
                number,
                round,
                transactions_root: Hash::zero(),
                timestamp,
                extra_data: Vec::new(),
                nonce: 0,
            },
            transactions,
        };
        block.header.transactions_root = block.calculate_transactions_root()?;
        Ok(block)
    }

    /// Get the block hash (same as header hash)
    pub fn hash(&self) -> CoreResult<Hash> {
        self.header.hash()
    }

    /// The tip this block extends
    pub fn tip(&self) -> Hash {
        self.header.parent_hash
    }

    /// Calculate the transactions root hash
    pub fn calculate_transactions_root(&self) -> CoreResult<Hash> {
        if self.transactions.is_empty() {
            return Ok(Hash::zero());
        }

        // Hash of concatenated transaction hashes
        let mut concatenated = Vec::with_capacity(self.transactions.len() * 32);
        for tx in &self.transactions {
            concatenated.extend_from_slice(tx.hash()?.as_bytes());
        }

        Ok(keccak256(&concatenated))
    }

    /// Ids of the contained transactions, in block order
    pub fn transaction_ids(&self) -> CoreResult<Vec<Hash>> {
        self.transactions.iter().map(Transaction::hash).collect()
    }
}
