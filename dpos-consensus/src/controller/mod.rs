//! dPoS consensus controller
//!
//! Mediates between the network, the voter and persistent storage. Every
//! incoming fact goes through the same pipeline: de-duplicate by hash,
//! authenticate the signer, apply to the voter, act on the step result,
//! persist and relay.
//!
//! All consensus state sits behind one mutex. Store writes and network
//! calls made while holding it must stay non-blocking; block submission
//! happens after the lock is released.

pub mod dispatch;
pub mod event_loop;

pub use dispatch::{dispatch, run_dispatcher};
pub use event_loop::{run_event_loop, run_heartbeat_ticker};

use crate::config::DposConfig;
use crate::identity::IdentityResolver;
use crate::liveness::HeartbeatTracker;
use crate::traits::{
    BlockSubmitter, ChainView, DposStore, MasternodeRegistry, ValidationCallbacks, Wallet,
};
use crate::voter::{ConsensusStepResult, RoundVote, TxVote, Voter};
use crate::{ConsensusError, ConsensusResult};
use dpos_core::{
    Hash, RoundVoteP2p, Round, SignedVote, Transaction, TxVoteP2p, ViceBlock,
};
use dpos_network::{DposMessage, InvKind, Inventory, PeerId, PeerNetwork, RelayCache};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Host services the controller is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainView>,
    pub registry: Arc<dyn MasternodeRegistry>,
    pub wallet: Arc<dyn Wallet>,
    pub store: Arc<dyn DposStore>,
    pub network: Arc<dyn PeerNetwork>,
    pub submitter: Arc<dyn BlockSubmitter>,
    pub validation: Arc<dyn ValidationCallbacks>,
}

/// Where a fact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Live input; persisted and relayed once accepted
    Network,
    /// Replayed from the store at startup
    Store,
}

struct ControllerState {
    voter: Voter,
    vice_blocks: BTreeMap<Hash, ViceBlock>,
    round_votes: BTreeMap<Hash, RoundVoteP2p>,
    tx_votes: BTreeMap<Hash, TxVoteP2p>,
}

/// Snapshot of the controller for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DposStatus {
    pub enabled: bool,
    pub voter: bool,
    pub tip: Hash,
    pub round: Round,
    pub vice_blocks: usize,
    pub round_votes: usize,
    pub tx_votes: usize,
}

/// dPoS consensus controller
pub struct DposController {
    config: DposConfig,
    state: Mutex<ControllerState>,
    identity: IdentityResolver,
    heartbeats: Arc<HeartbeatTracker>,
    relay: Arc<RelayCache>,
    chain: Arc<dyn ChainView>,
    registry: Arc<dyn MasternodeRegistry>,
    store: Arc<dyn DposStore>,
    network: Arc<dyn PeerNetwork>,
    submitter: Arc<dyn BlockSubmitter>,
    validation: Arc<dyn ValidationCallbacks>,
    started_at: Instant,
}

impl DposController {
    /// Create a new controller
    pub fn new(config: DposConfig, collaborators: Collaborators) -> ConsensusResult<Self> {
        config.validate()?;

        let relay = Arc::new(RelayCache::new(config.relay_expiry_as_duration()));
        let identity = IdentityResolver::new(
            collaborators.chain.clone(),
            collaborators.registry.clone(),
            collaborators.wallet.clone(),
            config.team_lookback,
        );
        let heartbeats = Arc::new(HeartbeatTracker::new(
            collaborators.registry.clone(),
            collaborators.chain.clone(),
            collaborators.network.clone(),
            relay.clone(),
            HeartbeatTracker::now_ms(),
            config.heartbeat_max_future_ms(),
        ));

        let mut voter = Voter::new(config.quorum());
        voter.update_tip(collaborators.chain.tip_hash());

        info!(
            "dPoS controller created: team size {}, quorum {}",
            config.team_size,
            config.quorum()
        );

        Ok(Self {
            config,
            state: Mutex::new(ControllerState {
                voter,
                vice_blocks: BTreeMap::new(),
                round_votes: BTreeMap::new(),
                tx_votes: BTreeMap::new(),
            }),
            identity,
            heartbeats,
            relay,
            chain: collaborators.chain,
            registry: collaborators.registry,
            store: collaborators.store,
            network: collaborators.network,
            submitter: collaborators.submitter,
            validation: collaborators.validation,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn heartbeats(&self) -> &Arc<HeartbeatTracker> {
        &self.heartbeats
    }

    pub fn relay_cache(&self) -> &Arc<RelayCache> {
        &self.relay
    }

    /// dPoS is active: upgrade height reached and enough masternodes
    pub fn is_enabled(&self) -> bool {
        self.chain.tip_height() >= self.config.upgrade_height
            && self.registry.active_count() >= self.config.min_masternode_count
    }

    pub fn is_voter(&self) -> bool {
        self.state.lock().voter.check_am_i_voter()
    }

    /// Replay stored facts into the voter; must run before voting starts
    pub fn initialize(&self) -> ConsensusResult<()> {
        if self.is_voter() {
            return Err(ConsensusError::AlreadyVoter);
        }

        let vice_blocks = self.store.load_vice_blocks()?;
        let round_votes = self.store.load_round_votes()?;
        let tx_votes = self.store.load_tx_votes()?;
        let loaded = (vice_blocks.len(), round_votes.len(), tx_votes.len());

        let mut accepted = 0usize;
        for (_, block) in vice_blocks {
            accepted += usize::from(self.accept_vice_block(block, Origin::Store));
        }
        for (_, vote) in round_votes {
            accepted += usize::from(self.accept_round_vote(vote, Origin::Store));
        }
        for (_, vote) in tx_votes {
            accepted += usize::from(self.accept_tx_vote(vote, Origin::Store));
        }

        info!(
            "dPoS state replayed: {} vice blocks, {} round votes, {} tx votes loaded, {} accepted",
            loaded.0, loaded.1, loaded.2, accepted
        );
        Ok(())
    }

    /// Accept a candidate block from the network
    pub fn proceed_vice_block(&self, block: ViceBlock) -> bool {
        self.accept_vice_block(block, Origin::Network)
    }

    /// Accept a signed round vote from the network
    pub fn proceed_round_vote(&self, vote: RoundVoteP2p) -> bool {
        self.accept_round_vote(vote, Origin::Network)
    }

    /// Accept a signed tx vote from the network
    pub fn proceed_tx_vote(&self, vote: TxVoteP2p) -> bool {
        self.accept_tx_vote(vote, Origin::Network)
    }

    /// Offer a transaction to the voter; ignored once any tip has seen it
    pub fn proceed_transaction(&self, tx: Transaction) -> bool {
        let txid = match tx.hash() {
            Ok(txid) => txid,
            Err(e) => {
                debug!("Failed to hash transaction: {}", e);
                return false;
            }
        };

        let submit = {
            let mut state = self.state.lock();
            if state.voter.has_seen_tx(&txid) {
                return false;
            }

            let result = state.voter.apply_tx(tx);
            match self.handle_output(&mut state, result) {
                Ok(submit) => submit,
                Err(_) => return false,
            }
        };

        self.submit(submit);
        true
    }

    fn accept_vice_block(&self, block: ViceBlock, origin: Origin) -> bool {
        let hash = match block.hash() {
            Ok(hash) => hash,
            Err(e) => {
                debug!("Failed to hash vice block: {}", e);
                return false;
            }
        };

        let submit = {
            let mut state = self.state.lock();
            if state.vice_blocks.contains_key(&hash) {
                return false;
            }

            let result = state.voter.apply_vice_block(block.clone());
            let submit = match self.handle_output(&mut state, result) {
                Ok(submit) => submit,
                Err(_) => return false,
            };

            state.vice_blocks.insert(hash, block.clone());
            if origin == Origin::Network {
                if let Err(e) = self.store.write_vice_block(&block.tip(), &hash, &block) {
                    error!("Failed to persist vice block {}: {}", hash, e);
                }
                self.relay(DposMessage::ViceBlock(Box::new(block)));
            }
            debug!("Vice block {} accepted", hash);
            submit
        };

        self.submit(submit);
        true
    }

    fn accept_round_vote(&self, vote: RoundVoteP2p, origin: Origin) -> bool {
        let hash = match vote.hash() {
            Ok(hash) => hash,
            Err(e) => {
                debug!("Failed to hash round vote: {}", e);
                return false;
            }
        };

        let submit = {
            let mut state = self.state.lock();
            if state.round_votes.contains_key(&hash) {
                return false;
            }

            let Some(voter) = self.identity.extract_masternode_id(&vote) else {
                debug!("Dropping unauthenticated round vote {}", hash);
                return false;
            };

            let result = state.voter.apply_round_vote(RoundVote {
                tip: vote.tip,
                voter,
                round: vote.round,
                choice: vote.choice,
            });
            let submit = match self.handle_output(&mut state, result) {
                Ok(submit) => submit,
                Err(_) => return false,
            };

            state.round_votes.insert(hash, vote.clone());
            if origin == Origin::Network {
                if let Err(e) = self.store.write_round_vote(&vote.tip, &hash, &vote) {
                    error!("Failed to persist round vote {}: {}", hash, e);
                }
                self.relay(DposMessage::RoundVote(vote));
            }
            submit
        };

        self.submit(submit);
        true
    }

    fn accept_tx_vote(&self, vote: TxVoteP2p, origin: Origin) -> bool {
        let hash = match vote.hash() {
            Ok(hash) => hash,
            Err(e) => {
                debug!("Failed to hash tx vote: {}", e);
                return false;
            }
        };

        let submit = {
            let mut state = self.state.lock();
            if state.tx_votes.contains_key(&hash) {
                return false;
            }

            let Some(voter) = self.identity.extract_masternode_id(&vote) else {
                debug!("Dropping unauthenticated tx vote {}", hash);
                return false;
            };
            if vote.choices.is_empty() {
                debug!("Dropping tx vote {} without choices", hash);
                return false;
            }

            let mut applied = Vec::with_capacity(vote.choices.len());
            let mut combined = ConsensusStepResult::default();
            for choice in &vote.choices {
                let tx_vote = TxVote {
                    tip: vote.tip,
                    voter,
                    round: vote.round,
                    choice: *choice,
                };
                let previous = state.voter.stored_tx_vote(&tx_vote);
                let result = state.voter.apply_tx_vote(tx_vote.clone());
                let failed = !result.is_ok();
                applied.push((tx_vote, previous));
                combined.merge(result);
                if failed {
                    break;
                }
            }

            if !combined.is_ok() {
                for (tx_vote, previous) in applied.into_iter().rev() {
                    state.voter.revert_tx_vote(&tx_vote, previous);
                }
            }

            let submit = match self.handle_output(&mut state, combined) {
                Ok(submit) => submit,
                Err(_) => return false,
            };

            state.tx_votes.insert(hash, vote.clone());
            if origin == Origin::Network {
                if let Err(e) = self.store.write_tx_vote(&vote.tip, &hash, &vote) {
                    error!("Failed to persist tx vote {}: {}", hash, e);
                }
                self.relay(DposMessage::TxVote(vote));
            }
            submit
        };

        self.submit(submit);
        true
    }

    /// Act on a voter step: reject on any error, otherwise sign, record,
    /// persist and relay own votes. Returns the block to submit.
    fn handle_output(
        &self,
        state: &mut ControllerState,
        result: ConsensusStepResult,
    ) -> ConsensusResult<Option<ViceBlock>> {
        if !result.errors.is_empty() {
            for e in &result.errors {
                warn!("dPoS voter error: {}", e);
            }
            return Err(ConsensusError::StepRejected(result.errors.len()));
        }

        if result.round_votes.is_empty() && result.tx_votes.is_empty() {
            return Ok(result.block_to_submit);
        }

        let Some(key) = self.identity.masternode_key() else {
            error!("dPoS voter emitted votes but no operator key is available");
            return Ok(result.block_to_submit);
        };

        for vote in result.round_votes {
            let mut signed = RoundVoteP2p::new(vote.tip, vote.round, vote.choice);
            if let Err(e) = signed.sign(&key) {
                error!("Failed to sign round vote: {}", e);
                continue;
            }
            let hash = match signed.hash() {
                Ok(hash) => hash,
                Err(e) => {
                    error!("Failed to hash own round vote: {}", e);
                    continue;
                }
            };

            info!(
                "Casting round vote {:?} for tip {} round {}",
                signed.choice.decision, signed.tip, signed.round
            );
            state.round_votes.insert(hash, signed.clone());
            if let Err(e) = self.store.write_round_vote(&signed.tip, &hash, &signed) {
                error!("Failed to persist own round vote {}: {}", hash, e);
            }
            self.relay(DposMessage::RoundVote(signed));
        }

        for vote in result.tx_votes {
            let mut signed = TxVoteP2p::new(vote.tip, vote.round, vec![vote.choice]);
            if let Err(e) = signed.sign(&key) {
                error!("Failed to sign tx vote: {}", e);
                continue;
            }
            let hash = match signed.hash() {
                Ok(hash) => hash,
                Err(e) => {
                    error!("Failed to hash own tx vote: {}", e);
                    continue;
                }
            };

            debug!(
                "Casting tx vote {:?} on {} for tip {}",
                vote.choice.decision, vote.choice.subject, signed.tip
            );
            state.tx_votes.insert(hash, signed.clone());
            if let Err(e) = self.store.write_tx_vote(&signed.tip, &hash, &signed) {
                error!("Failed to persist own tx vote {}: {}", hash, e);
            }
            self.relay(DposMessage::TxVote(signed));
        }

        Ok(result.block_to_submit)
    }

    fn submit(&self, block: Option<ViceBlock>) {
        let Some(block) = block else {
            return;
        };

        match self.submitter.submit_block(&block) {
            Ok(()) => info!(
                "Submitted finalized block #{} on tip {}",
                block.header.number,
                block.tip()
            ),
            Err(e) => error!("Failed to submit finalized block: {}", e),
        }
    }

    /// Cache the payload and announce it
    fn relay(&self, message: DposMessage) {
        let inventory = match message.inventory() {
            Ok(Some(inventory)) => inventory,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to compute inventory for {}: {}", message.name(), e);
                return;
            }
        };

        if let Err(e) = self.relay.insert(inventory, &message) {
            warn!("Failed to cache {} {}: {}", message.name(), inventory.hash, e);
            return;
        }
        if let Err(e) = self.network.broadcast_inventory(inventory) {
            warn!("Failed to announce {} {}: {}", message.name(), inventory.hash, e);
        }
    }

    /// Switch the voter to a new chain tip
    pub fn update_chain_tip(&self, tip: Hash) {
        self.state.lock().voter.update_tip(tip);
    }

    /// Start voting once warmed up, synced and holding an operator identity
    pub fn activate_if_ready(&self, now: Instant) -> bool {
        if now.saturating_duration_since(self.started_at) < self.config.voter_warmup_as_duration() {
            return false;
        }

        let mut state = self.state.lock();
        if state.voter.check_am_i_voter()
            || self.chain.is_initial_block_download()
            || !self.is_enabled()
        {
            return false;
        }

        let Some(self_id) = self.identity.resolve_masternode_id(None) else {
            return false;
        };

        let tip = self.chain.tip_hash();
        state
            .voter
            .set_voting(tip, self.validation.clone(), true, self_id);
        true
    }

    /// Ask every connected peer for the votes we may have missed
    pub fn reconcile_with_peers(&self) {
        let peers = self.network.connected_peers();
        if peers.is_empty() {
            return;
        }

        let known: Vec<TxVoteP2p> = self.state.lock().tx_votes.values().cloned().collect();
        debug!(
            "Reconciling dPoS votes with {} peers ({} known tx votes)",
            peers.len(),
            known.len()
        );

        for peer in peers {
            if let Err(e) = self.network.push_message(&peer, DposMessage::GetRoundVotes) {
                debug!("Failed to request round votes from {}: {}", peer, e);
            }
            if let Err(e) = self
                .network
                .push_message(&peer, DposMessage::GetTxVotes(known.clone()))
            {
                debug!("Failed to request tx votes from {}: {}", peer, e);
            }
        }
    }

    /// Send `peer` every round vote we know
    pub fn handle_get_round_votes(&self, peer: &PeerId) {
        for vote in self.list_round_votes() {
            if let Err(e) = self.network.push_message(peer, DposMessage::RoundVote(vote)) {
                debug!("Failed to send round vote to {}: {}", peer, e);
                return;
            }
        }
    }

    /// Send `peer` the tx votes missing from its list
    pub fn handle_get_tx_votes(&self, peer: &PeerId, theirs: &[TxVoteP2p]) {
        let theirs: HashSet<Hash> = theirs.iter().filter_map(|vote| vote.hash().ok()).collect();
        let missing: Vec<TxVoteP2p> = self
            .state
            .lock()
            .tx_votes
            .iter()
            .filter(|(hash, _)| !theirs.contains(*hash))
            .map(|(_, vote)| vote.clone())
            .collect();

        for vote in missing {
            if let Err(e) = self.network.push_message(peer, DposMessage::TxVote(vote)) {
                debug!("Failed to send tx vote to {}: {}", peer, e);
                return;
            }
        }
    }

    /// Request announced payloads we do not have yet
    pub fn handle_inventory(&self, peer: &PeerId, inventory: &[Inventory]) {
        let wanted: Vec<Inventory> = inventory
            .iter()
            .filter(|entry| !self.knows(entry))
            .copied()
            .collect();
        if wanted.is_empty() {
            return;
        }

        if let Err(e) = self.network.push_message(peer, DposMessage::GetData(wanted)) {
            debug!("Failed to request data from {}: {}", peer, e);
        }
    }

    /// Answer a payload request from the relay cache
    pub fn serve_get_data(&self, peer: &PeerId, inventory: &[Inventory]) {
        for entry in inventory {
            match self.relay.get_message(entry) {
                Ok(Some(message)) => {
                    if let Err(e) = self.network.push_message(peer, message) {
                        debug!("Failed to serve {:?} to {}: {}", entry.kind, peer, e);
                        return;
                    }
                }
                Ok(None) => debug!("Requested {:?} {} not in relay cache", entry.kind, entry.hash),
                Err(e) => warn!("Corrupt relay cache entry {}: {}", entry.hash, e),
            }
        }
    }

    fn knows(&self, entry: &Inventory) -> bool {
        match entry.kind {
            InvKind::ViceBlock => self.state.lock().vice_blocks.contains_key(&entry.hash),
            InvKind::RoundVote => self.state.lock().round_votes.contains_key(&entry.hash),
            InvKind::TxVote => self.state.lock().tx_votes.contains_key(&entry.hash),
            InvKind::Heartbeat => self.heartbeats.find_by_hash(&entry.hash).is_some(),
        }
    }

    pub fn find_vice_block(&self, hash: &Hash) -> Option<ViceBlock> {
        self.state.lock().vice_blocks.get(hash).cloned()
    }

    pub fn find_round_vote(&self, hash: &Hash) -> Option<RoundVoteP2p> {
        self.state.lock().round_votes.get(hash).cloned()
    }

    pub fn find_tx_vote(&self, hash: &Hash) -> Option<TxVoteP2p> {
        self.state.lock().tx_votes.get(hash).cloned()
    }

    pub fn list_vice_blocks(&self) -> Vec<ViceBlock> {
        self.state.lock().vice_blocks.values().cloned().collect()
    }

    pub fn list_round_votes(&self) -> Vec<RoundVoteP2p> {
        self.state.lock().round_votes.values().cloned().collect()
    }

    pub fn list_tx_votes(&self) -> Vec<TxVoteP2p> {
        self.state.lock().tx_votes.values().cloned().collect()
    }

    /// Committed transactions of the current tip in canonical order
    pub fn list_committed_transactions(&self) -> Vec<Transaction> {
        self.state
            .lock()
            .voter
            .list_committed_txs()
            .into_values()
            .collect()
    }

    pub fn status(&self) -> DposStatus {
        let enabled = self.is_enabled();
        let state = self.state.lock();
        let tip = state.voter.current_tip();
        DposStatus {
            enabled,
            voter: state.voter.check_am_i_voter(),
            tip,
            round: state.voter.current_round(&tip),
            vice_blocks: state.vice_blocks.len(),
            round_votes: state.round_votes.len(),
            tx_votes: state.tx_votes.len(),
        }
    }
}
