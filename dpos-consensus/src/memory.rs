//! In-memory host collaborators
//!
//! Used by the test suites and by standalone (devnet) nodes that run the
//! consensus layer without a full chain backend.

use crate::traits::{
    BlockSubmitter, ChainView, CommittedTxs, DposStore, MasternodeInfo, MasternodeRegistry,
    ValidationCallbacks, Wallet,
};
use crate::{ConsensusError, ConsensusResult};
use dpos_core::crypto::keccak256;
use dpos_core::{
    BlockNumber, Hash, KeyId, MasternodeId, RoundVoteP2p, SigningKey, Timestamp, Transaction,
    TxVoteP2p, ViceBlock,
};
use dpos_network::{DposMessage, Inventory, NetworkResult, PeerId, PeerNetwork};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Linear chain of synthetic block hashes
#[derive(Debug)]
pub struct MemoryChain {
    blocks: RwLock<Vec<(Hash, Timestamp)>>,
    initial_block_download: RwLock<bool>,
}

impl MemoryChain {
    /// Chain of `count` blocks (heights `0..count`), one second apart
    pub fn with_blocks(count: u64) -> Self {
        let chain = Self {
            blocks: RwLock::new(Vec::new()),
            initial_block_download: RwLock::new(false),
        };
        for _ in 0..count.max(1) {
            chain.push_block();
        }
        chain
    }

    /// Extend the chain by one block; returns its hash
    pub fn push_block(&self) -> Hash {
        let mut blocks = self.blocks.write();
        let height = blocks.len() as u64;
        let hash = keccak256(&height.to_le_bytes());
        blocks.push((hash, height as Timestamp * 1000));
        hash
    }

    pub fn set_initial_block_download(&self, value: bool) {
        *self.initial_block_download.write() = value;
    }
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> BlockNumber {
        (self.blocks.read().len() as u64).saturating_sub(1)
    }

    fn tip_hash(&self) -> Hash {
        self.blocks
            .read()
            .last()
            .map(|(hash, _)| *hash)
            .unwrap_or_default()
    }

    fn block_hash_at(&self, height: BlockNumber) -> Option<Hash> {
        self.blocks.read().get(height as usize).map(|(hash, _)| *hash)
    }

    fn block_time_at(&self, height: BlockNumber) -> Option<Timestamp> {
        self.blocks.read().get(height as usize).map(|(_, time)| *time)
    }

    fn is_initial_block_download(&self) -> bool {
        *self.initial_block_download.read()
    }
}

/// Registry whose team is the same at every height
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    masternodes: RwLock<Vec<MasternodeInfo>>,
    team: RwLock<HashSet<KeyId>>,
    local_operator: RwLock<Option<KeyId>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: MasternodeId, operator: KeyId, activation_height: BlockNumber) {
        self.masternodes.write().push(MasternodeInfo {
            id,
            operator,
            activation_height,
        });
    }

    pub fn add_team_member(&self, operator: KeyId) {
        self.team.write().insert(operator);
    }

    pub fn set_local_operator(&self, operator: Option<KeyId>) {
        *self.local_operator.write() = operator;
    }
}

impl MasternodeRegistry for MemoryRegistry {
    fn active_count(&self) -> usize {
        self.masternodes.read().len()
    }

    fn masternodes(&self) -> Vec<MasternodeInfo> {
        self.masternodes.read().clone()
    }

    fn is_team_member(&self, _height: BlockNumber, operator: &KeyId) -> bool {
        self.team.read().contains(operator)
    }

    fn find_by_operator(&self, operator: &KeyId) -> Option<MasternodeId> {
        self.masternodes
            .read()
            .iter()
            .find(|info| &info.operator == operator)
            .map(|info| info.id)
    }

    fn local_operator(&self) -> Option<KeyId> {
        let operator = (*self.local_operator.read())?;
        self.find_by_operator(&operator).map(|_| operator)
    }
}

#[derive(Debug, Default)]
pub struct MemoryWallet {
    keys: RwLock<HashMap<KeyId, SigningKey>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, key: SigningKey) {
        self.keys.write().insert(key.key_id(), key);
    }
}

impl Wallet for MemoryWallet {
    fn get_key(&self, key_id: &KeyId) -> Option<SigningKey> {
        self.keys.read().get(key_id).cloned()
    }
}

/// Accepts everything except explicitly rejected transactions and blocks
#[derive(Debug, Default)]
pub struct MemoryValidation {
    rejected_txs: RwLock<HashSet<Hash>>,
    rejected_blocks: RwLock<HashSet<Hash>>,
    archivable: RwLock<HashSet<Hash>>,
}

impl MemoryValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_tx(&self, txid: Hash) {
        self.rejected_txs.write().insert(txid);
    }

    /// Undo an earlier `reject_tx`
    pub fn accept_tx(&self, txid: Hash) {
        self.rejected_txs.write().remove(&txid);
    }

    pub fn reject_block(&self, hash: Hash) {
        self.rejected_blocks.write().insert(hash);
    }

    pub fn allow_archiving_of(&self, tip: Hash) {
        self.archivable.write().insert(tip);
    }
}

impl ValidationCallbacks for MemoryValidation {
    fn validate_tx(&self, tx: &Transaction) -> ConsensusResult<()> {
        let txid = tx.hash()?;
        if self.rejected_txs.read().contains(&txid) {
            return Err(ConsensusError::InvalidTransaction {
                txid,
                reason: "rejected by validation".to_string(),
            });
        }
        Ok(())
    }

    fn validate_block(
        &self,
        block: &ViceBlock,
        _committed: &CommittedTxs,
        _check_txs: bool,
    ) -> ConsensusResult<()> {
        let hash = block.hash()?;
        if self.rejected_blocks.read().contains(&hash) {
            return Err(ConsensusError::InvalidBlock {
                hash,
                reason: "rejected by validation".to_string(),
            });
        }
        Ok(())
    }

    fn allow_archiving(&self, tip: &Hash) -> bool {
        self.archivable.read().contains(tip)
    }
}

/// Records submitted blocks
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    blocks: Mutex<Vec<ViceBlock>>,
    fail: RwLock<bool>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.write() = fail;
    }

    pub fn submitted(&self) -> Vec<ViceBlock> {
        self.blocks.lock().clone()
    }
}

impl BlockSubmitter for RecordingSubmitter {
    fn submit_block(&self, block: &ViceBlock) -> ConsensusResult<()> {
        if *self.fail.read() {
            return Err(ConsensusError::Other("block submission failed".to_string()));
        }
        self.blocks.lock().push(block.clone());
        Ok(())
    }
}

/// Store keeping every entity in ordered maps keyed by (tip, hash)
#[derive(Debug, Default)]
pub struct MemoryStore {
    vice_blocks: Mutex<BTreeMap<(Hash, Hash), ViceBlock>>,
    round_votes: Mutex<BTreeMap<(Hash, Hash), RoundVoteP2p>>,
    tx_votes: Mutex<BTreeMap<(Hash, Hash), TxVoteP2p>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations performed
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn round_vote_count(&self) -> usize {
        self.round_votes.lock().len()
    }

    pub fn tx_vote_count(&self) -> usize {
        self.tx_votes.lock().len()
    }

    pub fn vice_block_count(&self) -> usize {
        self.vice_blocks.lock().len()
    }

    /// Tips round votes were stored under
    pub fn round_vote_tips(&self) -> Vec<Hash> {
        self.round_votes.lock().keys().map(|(tip, _)| *tip).collect()
    }

    fn count_write(&self) {
        *self.writes.lock() += 1;
    }
}

impl DposStore for MemoryStore {
    fn write_vice_block(&self, tip: &Hash, hash: &Hash, block: &ViceBlock) -> ConsensusResult<()> {
        self.count_write();
        self.vice_blocks.lock().insert((*tip, *hash), block.clone());
        Ok(())
    }

    fn erase_vice_block(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        self.vice_blocks.lock().remove(&(*tip, *hash));
        Ok(())
    }

    fn write_round_vote(&self, tip: &Hash, hash: &Hash, vote: &RoundVoteP2p) -> ConsensusResult<()> {
        self.count_write();
        self.round_votes.lock().insert((*tip, *hash), vote.clone());
        Ok(())
    }

    fn erase_round_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        self.round_votes.lock().remove(&(*tip, *hash));
        Ok(())
    }

    fn write_tx_vote(&self, tip: &Hash, hash: &Hash, vote: &TxVoteP2p) -> ConsensusResult<()> {
        self.count_write();
        self.tx_votes.lock().insert((*tip, *hash), vote.clone());
        Ok(())
    }

    fn erase_tx_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()> {
        self.tx_votes.lock().remove(&(*tip, *hash));
        Ok(())
    }

    fn load_vice_blocks(&self) -> ConsensusResult<Vec<(Hash, ViceBlock)>> {
        Ok(self
            .vice_blocks
            .lock()
            .iter()
            .map(|((_, hash), block)| (*hash, block.clone()))
            .collect())
    }

    fn load_round_votes(&self) -> ConsensusResult<Vec<(Hash, RoundVoteP2p)>> {
        Ok(self
            .round_votes
            .lock()
            .iter()
            .map(|((_, hash), vote)| (*hash, vote.clone()))
            .collect())
    }

    fn load_tx_votes(&self) -> ConsensusResult<Vec<(Hash, TxVoteP2p)>> {
        Ok(self
            .tx_votes
            .lock()
            .iter()
            .map(|((_, hash), vote)| (*hash, vote.clone()))
            .collect())
    }
}

/// Records announcements and direct messages instead of sending them
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    announced: Mutex<Vec<Inventory>>,
    pushed: Mutex<Vec<(PeerId, DposMessage)>>,
    peers: RwLock<Vec<PeerId>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, peer: PeerId) {
        self.peers.write().push(peer);
    }

    pub fn announced(&self) -> Vec<Inventory> {
        self.announced.lock().clone()
    }

    pub fn pushed(&self) -> Vec<(PeerId, DposMessage)> {
        self.pushed.lock().clone()
    }

    pub fn clear(&self) {
        self.announced.lock().clear();
        self.pushed.lock().clear();
    }
}

impl PeerNetwork for RecordingNetwork {
    fn broadcast_inventory(&self, inventory: Inventory) -> NetworkResult<()> {
        self.announced.lock().push(inventory);
        Ok(())
    }

    fn push_message(&self, peer: &PeerId, message: DposMessage) -> NetworkResult<()> {
        self.pushed.lock().push((*peer, message));
        Ok(())
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_chain() {
        let chain = MemoryChain::with_blocks(3);
        assert_eq!(chain.tip_height(), 2);
        assert_eq!(chain.block_hash_at(2), Some(chain.tip_hash()));
        assert_eq!(chain.block_time_at(2), Some(2_000));
        assert_eq!(chain.block_hash_at(3), None);

        let new_tip = chain.push_block();
        assert_eq!(chain.tip_hash(), new_tip);
        assert_eq!(chain.tip_height(), 3);
    }

    #[test]
    fn test_local_operator_requires_registration() {
        let registry = MemoryRegistry::new();
        let operator = KeyId::new([1; 20]);
        registry.set_local_operator(Some(operator));
        assert_eq!(registry.local_operator(), None);

        registry.register(MasternodeId::new(Hash::new([1; 32])), operator, 0);
        assert_eq!(registry.local_operator(), Some(operator));
    }
}
