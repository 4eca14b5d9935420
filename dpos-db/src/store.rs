//! Persistent store of consensus entities

use crate::column_families::{entity_key, split_entity_key, ColumnFamily};
use crate::traits::KeyValueDB;
use crate::DbResult;
use dpos_consensus::{ConsensusResult, DposStore};
use dpos_core::crypto::{decode, encode};
use dpos_core::{Hash, RoundVoteP2p, TxVoteP2p, ViceBlock};
use tracing::warn;

/// Consensus store over any key-value backend
pub struct DposDb<D> {
    db: D,
}

impl<D: KeyValueDB> DposDb<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &D {
        &self.db
    }

    fn write<T: bincode::Encode>(
        &self,
        cf: ColumnFamily,
        tip: &Hash,
        hash: &Hash,
        value: &T,
    ) -> DbResult<()> {
        let bytes = encode(value)?;
        self.db.put(cf, &entity_key(tip, hash), &bytes)
    }

    fn erase(&self, cf: ColumnFamily, tip: &Hash, hash: &Hash) -> DbResult<()> {
        self.db.delete(cf, &entity_key(tip, hash))
    }

    /// Every decodable entry of `cf`; corrupt entries are skipped
    fn load<T: bincode::Decode<()>>(&self, cf: ColumnFamily) -> DbResult<Vec<(Hash, T)>> {
        let mut loaded = Vec::new();
        for (key, value) in self.db.iter(cf)? {
            let (_, hash) = match split_entity_key(&key) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Skipping {} entry: {}", cf, e);
                    continue;
                }
            };
            match decode::<T>(&value) {
                Ok(entity) => loaded.push((hash, entity)),
                Err(e) => warn!("Skipping undecodable {} entry {}: {}", cf, hash, e),
            }
        }
        Ok(loaded)
    }
}

impl<D: KeyValueDB> DposStore for DposDb<D> {
    fn write_vice_block(&self, tip: &Hash, hash: &Hash, block: &ViceBlock) -> ConsensusResult<()> {
        Ok(self.write(ColumnFamily::ViceBlocks, tip, hash, block)?)
    }

    fn erase_vice_block(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        Ok(self.erase(ColumnFamily::ViceBlocks, tip, hash)?)
    }

    fn write_round_vote(&self, tip: &Hash, hash: &Hash, vote: &RoundVoteP2p) -> ConsensusResult<()> {
        Ok(self.write(ColumnFamily::RoundVotes, tip, hash, vote)?)
    }

    fn erase_round_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        Ok(self.erase(ColumnFamily::RoundVotes, tip, hash)?)
    }

    fn write_tx_vote(&self, tip: &Hash, hash: &Hash, vote: &TxVoteP2p) -> ConsensusResult<()> {
        Ok(self.write(ColumnFamily::TxVotes, tip, hash, vote)?)
    }

    fn erase_tx_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        Ok(self.erase(ColumnFamily::TxVotes, tip, hash)?)
    }

    fn load_vice_blocks(&self) -> ConsensusResult<Vec<(Hash, ViceBlock)>> {
        Ok(self.load(ColumnFamily::ViceBlocks)?)
    }

    fn load_round_votes(&self) -> ConsensusResult<Vec<(Hash, RoundVoteP2p)>> {
        Ok(self.load(ColumnFamily::RoundVotes)?)
    }

    fn load_tx_votes(&self) -> ConsensusResult<Vec<(Hash, TxVoteP2p)>> {
        Ok(self.load(ColumnFamily::TxVotes)?)
    }
}
