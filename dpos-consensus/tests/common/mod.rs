#![allow(dead_code)]

use dpos_consensus::memory::{
    MemoryChain, MemoryRegistry, MemoryStore, MemoryValidation, MemoryWallet, RecordingNetwork,
    RecordingSubmitter,
};
use dpos_consensus::{Collaborators, DposConfig, DposController};
use dpos_core::{
    Hash, MasternodeId, Round, RoundVoteP2p, SignedVote, SigningKey, Transaction, TxVoteP2p,
    ViceBlock, VoteChoice,
};
use std::sync::Arc;
use std::time::Instant;

/// Controller for a team of remote members plus the local masternode,
/// wired to in-memory collaborators
pub struct Harness {
    pub chain: Arc<MemoryChain>,
    pub registry: Arc<MemoryRegistry>,
    pub wallet: Arc<MemoryWallet>,
    pub store: Arc<MemoryStore>,
    pub network: Arc<RecordingNetwork>,
    pub submitter: Arc<RecordingSubmitter>,
    pub validation: Arc<MemoryValidation>,
    pub controller: Arc<DposController>,
    /// Remote team members
    pub members: Vec<SigningKey>,
    /// This node's operator key
    pub local: SigningKey,
}

pub fn key(byte: u8) -> SigningKey {
    SigningKey::from_bytes(&[byte; 32]).unwrap()
}

pub fn mn(byte: u8) -> MasternodeId {
    MasternodeId::new(Hash::new([byte; 32]))
}

impl Harness {
    /// Team of `team_size`: members 1..team_size are remote, the last is local
    pub fn new(team_size: usize) -> Self {
        Self::with_store(team_size, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(team_size: usize, store: Arc<MemoryStore>) -> Self {
        Self::build(DposConfig::with_team_size(team_size).with_voter_warmup(0), store)
    }

    pub fn build(config: DposConfig, store: Arc<MemoryStore>) -> Self {
        let team_size = config.team_size;
        let chain = Arc::new(MemoryChain::with_blocks(10));
        let registry = Arc::new(MemoryRegistry::new());
        let wallet = Arc::new(MemoryWallet::new());
        let network = Arc::new(RecordingNetwork::new());
        let submitter = Arc::new(RecordingSubmitter::new());
        let validation = Arc::new(MemoryValidation::new());

        let mut keys: Vec<SigningKey> = (1..=team_size as u8).map(key).collect();
        for (index, member) in keys.iter().enumerate() {
            let byte = index as u8 + 1;
            registry.register(mn(byte), member.key_id(), 0);
            registry.add_team_member(member.key_id());
        }
        let local = keys.pop().unwrap();
        registry.set_local_operator(Some(local.key_id()));
        wallet.add_key(local.clone());

        let collaborators = Collaborators {
            chain: chain.clone(),
            registry: registry.clone(),
            wallet: wallet.clone(),
            store: store.clone(),
            network: network.clone(),
            submitter: submitter.clone(),
            validation: validation.clone(),
        };
        let controller = Arc::new(DposController::new(config, collaborators).unwrap());

        Self {
            chain,
            registry,
            wallet,
            store,
            network,
            submitter,
            validation,
            controller,
            members: keys,
            local,
        }
    }

    pub fn tip(&self) -> Hash {
        use dpos_consensus::ChainView;
        self.chain.tip_hash()
    }

    pub fn activate(&self) {
        assert!(self.controller.activate_if_ready(Instant::now()));
        assert!(self.controller.is_voter());
    }

    /// Round vote for the current tip signed by remote member `index`
    pub fn round_vote(&self, index: usize, round: Round, choice: VoteChoice) -> RoundVoteP2p {
        let mut vote = RoundVoteP2p::new(self.tip(), round, choice);
        vote.sign(&self.members[index]).unwrap();
        vote
    }

    /// Tx vote for the current tip signed by remote member `index`
    pub fn tx_vote(&self, index: usize, choices: Vec<VoteChoice>) -> TxVoteP2p {
        let mut vote = TxVoteP2p::new(self.tip(), 0, choices);
        vote.sign(&self.members[index]).unwrap();
        vote
    }

    pub fn vice_block(&self, round: Round, nonce: u64) -> ViceBlock {
        let mut block = ViceBlock::new(self.tip(), 10, round, 10_000, vec![]).unwrap();
        block.header.nonce = nonce;
        block
    }

    /// Round votes signed by this node
    pub fn own_round_votes(&self) -> Vec<RoundVoteP2p> {
        self.controller
            .list_round_votes()
            .into_iter()
            .filter(|vote| vote.signer().ok() == Some(self.local.key_id()))
            .collect()
    }

    /// Tx votes signed by this node
    pub fn own_tx_votes(&self) -> Vec<TxVoteP2p> {
        self.controller
            .list_tx_votes()
            .into_iter()
            .filter(|vote| vote.signer().ok() == Some(self.local.key_id()))
            .collect()
    }
}

pub fn transaction(input: u8) -> Transaction {
    use dpos_core::OutPoint;
    Transaction::new(vec![OutPoint::new(Hash::new([input; 32]), 0)], vec![input])
}

/// Signature with s replaced by n - s and the recovery parity flipped;
/// recovers to the same key unless high-s forms are refused
pub fn high_s_twin(signature: &[u8]) -> Vec<u8> {
    const ORDER: [u8; 32] = [
        0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
        0x41, 0x41,
    ];
    let mut twin = signature.to_vec();
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let diff = ORDER[i] as i16 - signature[32 + i] as i16 - borrow;
        borrow = i16::from(diff < 0);
        twin[32 + i] = diff.rem_euclid(256) as u8;
    }
    twin[64] ^= 1;
    twin
}
