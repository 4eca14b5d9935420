//! Round-based voting state machine
//!
//! The voter keeps one [`TipState`] per tip and absorbs one authenticated
//! fact at a time. Each call answers with a [`ConsensusStepResult`] telling
//! the caller which votes to sign and broadcast and whether a block was
//! finalized.
//!
//! Rules, per tip, re-evaluated after every fact:
//! - a known vice block with a quorum of `Yes` votes in a round at or above
//!   the current round finalizes the tip;
//! - otherwise a quorum of `Pass` votes in such a round moves the tip to the
//!   next round, where a voting node casts exactly one vote.

pub mod state;

pub use state::{ConsensusStepResult, RoundVote, TipState, TxVote};

use crate::traits::{CommittedTxs, ValidationCallbacks};
use crate::ConsensusError;
use dpos_core::{Hash, MasternodeId, Round, Transaction, ViceBlock, VoteChoice, VoteDecision};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// dPoS voter over all known tips
pub struct Voter {
    tips: HashMap<Hash, TipState>,
    current_tip: Hash,
    /// Votes needed for a quorum
    min_quorum: usize,
    voting: bool,
    self_id: Option<MasternodeId>,
    callbacks: Option<Arc<dyn ValidationCallbacks>>,
}

impl Voter {
    pub fn new(min_quorum: usize) -> Self {
        Self {
            tips: HashMap::new(),
            current_tip: Hash::zero(),
            min_quorum: min_quorum.max(1),
            voting: false,
            self_id: None,
            callbacks: None,
        }
    }

    /// Enable or disable active participation on `tip`
    pub fn set_voting(
        &mut self,
        tip: Hash,
        callbacks: Arc<dyn ValidationCallbacks>,
        enabled: bool,
        self_id: MasternodeId,
    ) {
        self.callbacks = Some(callbacks);
        self.voting = enabled;
        self.self_id = Some(self_id);
        self.update_tip(tip);

        if enabled {
            info!("dPoS voting enabled as {} on tip {}", self_id, tip);
        } else {
            info!("dPoS voting disabled");
        }
    }

    /// Whether this node is an active participant
    pub fn check_am_i_voter(&self) -> bool {
        self.voting && self.self_id.is_some() && self.callbacks.is_some()
    }

    pub fn current_tip(&self) -> Hash {
        self.current_tip
    }

    pub fn min_quorum(&self) -> usize {
        self.min_quorum
    }

    pub fn tip_state(&self, tip: &Hash) -> Option<&TipState> {
        self.tips.get(tip)
    }

    /// Current round of `tip` (0 for unknown tips)
    pub fn current_round(&self, tip: &Hash) -> Round {
        self.tips.get(tip).map_or(0, |state| state.current_round)
    }

    /// Whether any tip has seen the transaction
    pub fn has_seen_tx(&self, txid: &Hash) -> bool {
        self.tips.values().any(|state| state.txs.contains_key(txid))
    }

    /// Switch the tip locally originated votes are cast for.
    ///
    /// Other tips are archived when the host allows it; their state is kept.
    pub fn update_tip(&mut self, tip: Hash) {
        if self.current_tip != tip {
            debug!("dPoS tip changed: {} -> {}", self.current_tip, tip);
        }
        self.current_tip = tip;
        self.tips.entry(tip).or_default().archived = false;

        let Some(callbacks) = self.callbacks.clone() else {
            return;
        };
        for (other, state) in self.tips.iter_mut() {
            if *other != tip && !state.archived && callbacks.allow_archiving(other) {
                debug!("Archiving dPoS state of tip {}", other);
                state.archived = true;
            }
        }
    }

    /// Committed transactions of the current tip in canonical order
    pub fn list_committed_txs(&self) -> CommittedTxs {
        self.tips
            .get(&self.current_tip)
            .map(|state| state.committed_txs(self.min_quorum))
            .unwrap_or_default()
    }

    /// Register a candidate block and vote for it when appropriate
    pub fn apply_vice_block(&mut self, block: ViceBlock) -> ConsensusStepResult {
        let tip = block.tip();
        let hash = match block.hash() {
            Ok(hash) => hash,
            Err(e) => return ConsensusStepResult::error(e.into()),
        };

        let min_quorum = self.min_quorum;
        let voting_here = self.check_am_i_voter() && tip == self.current_tip;
        let callbacks = self.callbacks.clone();
        let self_id = self.self_id;

        let state = self.tips.entry(tip).or_default();
        if state.archived {
            return ConsensusStepResult::error(ConsensusError::ArchivedTip(tip));
        }
        if state.vice_blocks.contains_key(&hash) {
            return ConsensusStepResult::default();
        }

        let round = block.header.round;
        let mut result = ConsensusStepResult::default();
        if let (true, Some(callbacks), Some(self_id)) = (voting_here, callbacks, self_id) {
            if round == state.current_round && state.finalized.is_none() {
                let committed = state.committed_txs(min_quorum);
                if let Err(e) = callbacks.validate_block(&block, &committed, true) {
                    return ConsensusStepResult::error(ConsensusError::InvalidBlock {
                        hash,
                        reason: e.to_string(),
                    });
                }

                if !state.has_round_vote(round, &self_id) {
                    let vote = RoundVote {
                        tip,
                        voter: self_id,
                        round,
                        choice: VoteChoice::yes(hash),
                    };
                    state.insert_round_vote(vote.clone());
                    result.round_votes.push(vote);
                }
            }
        }

        state.vice_blocks.entry(hash).or_insert(block);
        debug!("Vice block {} registered for tip {} round {}", hash, tip, round);

        result.merge(self.evaluate(tip));
        result
    }

    /// Insert or replace a round vote and re-evaluate its tip
    pub fn apply_round_vote(&mut self, vote: RoundVote) -> ConsensusStepResult {
        if !vote.choice.is_well_formed() {
            return ConsensusStepResult::error(ConsensusError::InvalidVote(format!(
                "malformed round vote choice {:?} from {}",
                vote.choice, vote.voter
            )));
        }

        let tip = vote.tip;
        let state = self.tips.entry(tip).or_default();
        if state.archived {
            return ConsensusStepResult::error(ConsensusError::ArchivedTip(tip));
        }

        debug!(
            "Round vote {:?} from {} for tip {} round {}",
            vote.choice.decision, vote.voter, tip, vote.round
        );
        state.insert_round_vote(vote);
        self.evaluate(tip)
    }

    /// Insert or replace a transaction vote
    pub fn apply_tx_vote(&mut self, vote: TxVote) -> ConsensusStepResult {
        if vote.choice.decision == VoteDecision::Pass || !vote.choice.is_well_formed() {
            return ConsensusStepResult::error(ConsensusError::InvalidVote(format!(
                "malformed tx vote choice {:?} from {}",
                vote.choice, vote.voter
            )));
        }

        let state = self.tips.entry(vote.tip).or_default();
        if state.archived {
            return ConsensusStepResult::error(ConsensusError::ArchivedTip(vote.tip));
        }

        state.insert_tx_vote(vote);
        ConsensusStepResult::default()
    }

    /// Vote currently stored under the key of `vote` (tip, round, subject, voter)
    pub fn stored_tx_vote(&self, vote: &TxVote) -> Option<TxVote> {
        self.tips
            .get(&vote.tip)?
            .find_tx_vote(vote.round, &vote.choice.subject, &vote.voter)
            .cloned()
    }

    /// Undo an applied tx vote: remove it if it is still the stored one and
    /// put back the vote it replaced
    pub fn revert_tx_vote(&mut self, vote: &TxVote, previous: Option<TxVote>) -> bool {
        let Some(state) = self.tips.get_mut(&vote.tip) else {
            return false;
        };
        if !state.remove_tx_vote(vote) {
            return false;
        }
        if let Some(previous) = previous {
            state.insert_tx_vote(previous);
        }
        true
    }

    /// Register a transaction with the current tip and vote on it
    pub fn apply_tx(&mut self, tx: Transaction) -> ConsensusStepResult {
        let txid = match tx.hash() {
            Ok(txid) => txid,
            Err(e) => return ConsensusStepResult::error(e.into()),
        };
        if self.has_seen_tx(&txid) {
            return ConsensusStepResult::default();
        }

        let tip = self.current_tip;
        let voting = self.check_am_i_voter();
        let callbacks = self.callbacks.clone();
        let self_id = self.self_id;

        let (true, Some(callbacks), Some(self_id)) = (voting, callbacks, self_id) else {
            self.tips.entry(tip).or_default().txs.insert(txid, tx);
            return ConsensusStepResult::default();
        };

        if let Err(e) = callbacks.validate_tx(&tx) {
            return ConsensusStepResult::error(ConsensusError::InvalidTransaction {
                txid,
                reason: e.to_string(),
            });
        }

        let state = self.tips.entry(tip).or_default();
        state.txs.insert(txid, tx.clone());

        let conflicting = state
            .own_yes_txs(&self_id)
            .any(|voted| voted.conflicts_with(&tx));
        let choice = if conflicting {
            debug!("Transaction {} conflicts with a transaction already voted for", txid);
            VoteChoice::no(txid)
        } else {
            VoteChoice::yes(txid)
        };

        let vote = TxVote {
            tip,
            voter: self_id,
            round: state.current_round,
            choice,
        };
        state.insert_tx_vote(vote.clone());

        ConsensusStepResult {
            tx_votes: vec![vote],
            ..ConsensusStepResult::default()
        }
    }

    /// Apply the quorum rules to `tip` until nothing changes
    fn evaluate(&mut self, tip: Hash) -> ConsensusStepResult {
        let mut result = ConsensusStepResult::default();
        let voting_here = self.check_am_i_voter() && tip == self.current_tip;
        let min_quorum = self.min_quorum;
        let callbacks = self.callbacks.clone();
        let self_id = self.self_id;

        let Some(state) = self.tips.get_mut(&tip) else {
            return result;
        };

        loop {
            if state.finalized.is_some() {
                return result;
            }

            let rounds: Vec<Round> = state
                .round_votes
                .range(state.current_round..)
                .map(|(round, _)| *round)
                .collect();

            let mut advanced = false;
            for round in rounds {
                if let Some(hash) = state.yes_quorum_block(round, min_quorum) {
                    state.finalized = Some(hash);
                    info!("dPoS finalized vice block {} on tip {} in round {}", hash, tip, round);
                    if voting_here {
                        result.block_to_submit = state.vice_blocks.get(&hash).cloned();
                    }
                    return result;
                }

                if state.pass_count(round) >= min_quorum {
                    let next = round.saturating_add(1);
                    state.current_round = next;
                    info!("dPoS tip {} moved to round {}", tip, next);

                    if let (true, Some(callbacks), Some(self_id)) =
                        (voting_here, callbacks.as_ref(), self_id)
                    {
                        if !state.has_round_vote(next, &self_id) {
                            let choice = Self::choose_round_vote(state, next, min_quorum, callbacks.as_ref());
                            let vote = RoundVote {
                                tip,
                                voter: self_id,
                                round: next,
                                choice,
                            };
                            state.insert_round_vote(vote.clone());
                            result.round_votes.push(vote);
                        }
                    }

                    advanced = true;
                    break;
                }
            }

            if !advanced {
                return result;
            }
        }
    }

    /// `Yes` for the lowest-hash valid vice block of `round`, else `Pass`
    fn choose_round_vote(
        state: &TipState,
        round: Round,
        min_quorum: usize,
        callbacks: &dyn ValidationCallbacks,
    ) -> VoteChoice {
        let committed = state.committed_txs(min_quorum);
        state
            .vice_blocks_of_round(round)
            .find(|(_, block)| callbacks.validate_block(block, &committed, true).is_ok())
            .map(|(hash, _)| VoteChoice::yes(*hash))
            .unwrap_or_else(VoteChoice::pass)
    }
}
