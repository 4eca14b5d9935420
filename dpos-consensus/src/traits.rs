//! Interfaces of the host node the dPoS layer depends on

use crate::ConsensusResult;
use dpos_core::{
    BlockNumber, Hash, KeyId, MasternodeId, RoundVoteP2p, SigningKey, Timestamp, Transaction,
    TxIdSorted, TxVoteP2p, ViceBlock,
};
use std::collections::BTreeMap;

/// Committed transactions in their canonical order
pub type CommittedTxs = BTreeMap<TxIdSorted, Transaction>;

/// Read-only view of the underlying chain
pub trait ChainView: Send + Sync {
    /// Height of the chain head
    fn tip_height(&self) -> BlockNumber;

    /// Hash of the chain head
    fn tip_hash(&self) -> Hash;

    /// Hash of the active-chain block at `height`
    fn block_hash_at(&self, height: BlockNumber) -> Option<Hash>;

    /// Timestamp (ms) of the active-chain block at `height`
    fn block_time_at(&self, height: BlockNumber) -> Option<Timestamp>;

    /// Whether the node is still catching up with the network
    fn is_initial_block_download(&self) -> bool;
}

/// A registered masternode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeInfo {
    pub id: MasternodeId,
    /// Key the masternode signs votes and heartbeats with
    pub operator: KeyId,
    /// Height of the block that activated the masternode
    pub activation_height: BlockNumber,
}

/// Masternode registry
pub trait MasternodeRegistry: Send + Sync {
    /// Number of currently active masternodes
    fn active_count(&self) -> usize;

    /// Every registered masternode
    fn masternodes(&self) -> Vec<MasternodeInfo>;

    /// Whether `operator` belonged to the voting team at `height`
    fn is_team_member(&self, height: BlockNumber, operator: &KeyId) -> bool;

    /// Masternode operated by `operator`, if registered
    fn find_by_operator(&self, operator: &KeyId) -> Option<MasternodeId>;

    /// This node's operator key, if it runs an active masternode
    fn local_operator(&self) -> Option<KeyId>;
}

/// Access to the operator keys held by this node
pub trait Wallet: Send + Sync {
    fn get_key(&self, key_id: &KeyId) -> Option<SigningKey>;
}

/// Hands finalized blocks to block processing
pub trait BlockSubmitter: Send + Sync {
    fn submit_block(&self, block: &ViceBlock) -> ConsensusResult<()>;
}

/// Host checks the voter runs before casting votes
pub trait ValidationCallbacks: Send + Sync {
    /// Transaction is valid for inclusion
    fn validate_tx(&self, tx: &Transaction) -> ConsensusResult<()>;

    /// Block is valid on top of its tip; with `check_txs` its transactions
    /// must also match the committed set
    fn validate_block(
        &self,
        block: &ViceBlock,
        committed: &CommittedTxs,
        check_txs: bool,
    ) -> ConsensusResult<()>;

    /// State kept for `tip` may be archived
    fn allow_archiving(&self, tip: &Hash) -> bool;
}

/// Persistent storage of accepted consensus facts, per tip and keyed by hash
pub trait DposStore: Send + Sync {
    fn write_vice_block(&self, tip: &Hash, hash: &Hash, block: &ViceBlock) -> ConsensusResult<()>;

    fn erase_vice_block(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()>;

    fn write_round_vote(&self, tip: &Hash, hash: &Hash, vote: &RoundVoteP2p) -> ConsensusResult<()>;

    fn erase_round_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()>;

    fn write_tx_vote(&self, tip: &Hash, hash: &Hash, vote: &TxVoteP2p) -> ConsensusResult<()>;

    fn erase_tx_vote(&self, tip: &Hash, hash: &Hash) -> ConsensusResult<()>;

    /// Every stored vice block as (hash, block)
    fn load_vice_blocks(&self) -> ConsensusResult<Vec<(Hash, ViceBlock)>>;

    /// Every stored round vote as (hash, vote)
    fn load_round_votes(&self) -> ConsensusResult<Vec<(Hash, RoundVoteP2p)>>;

    /// Every stored tx vote as (hash, vote)
    fn load_tx_votes(&self) -> ConsensusResult<Vec<(Hash, TxVoteP2p)>>;
}
