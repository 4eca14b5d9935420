//! Per-tip voter state and step results

use crate::traits::CommittedTxs;
use crate::ConsensusError;
use dpos_core::{Hash, MasternodeId, Round, Transaction, TxIdSorted, ViceBlock, VoteChoice, VoteDecision};
use std::collections::BTreeMap;

/// Authenticated round vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundVote {
    pub tip: Hash,
    pub voter: MasternodeId,
    pub round: Round,
    pub choice: VoteChoice,
}

/// Authenticated vote on one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxVote {
    pub tip: Hash,
    pub voter: MasternodeId,
    pub round: Round,
    pub choice: VoteChoice,
}

/// Outcome of applying one fact to the voter
#[derive(Debug, Clone, Default)]
pub struct ConsensusStepResult {
    /// Problems found while applying the fact
    pub errors: Vec<ConsensusError>,
    /// Round votes this node should sign and broadcast
    pub round_votes: Vec<RoundVote>,
    /// Tx votes this node should sign and broadcast
    pub tx_votes: Vec<TxVote>,
    /// Block finalized by this step
    pub block_to_submit: Option<ViceBlock>,
}

impl ConsensusStepResult {
    pub fn error(error: ConsensusError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the step asks for nothing
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
            && self.round_votes.is_empty()
            && self.tx_votes.is_empty()
            && self.block_to_submit.is_none()
    }

    /// Fold a later step into this one
    pub fn merge(&mut self, other: ConsensusStepResult) {
        self.errors.extend(other.errors);
        self.round_votes.extend(other.round_votes);
        self.tx_votes.extend(other.tx_votes);
        if other.block_to_submit.is_some() {
            self.block_to_submit = other.block_to_submit;
        }
    }
}

/// Everything the voter knows about one tip
#[derive(Debug, Clone, Default)]
pub struct TipState {
    /// Candidate blocks by hash
    pub vice_blocks: BTreeMap<Hash, ViceBlock>,
    /// Transactions seen for this tip
    pub txs: BTreeMap<Hash, Transaction>,
    /// round -> voter -> vote
    pub round_votes: BTreeMap<Round, BTreeMap<MasternodeId, RoundVote>>,
    /// round -> txid -> voter -> vote
    pub tx_votes: BTreeMap<Round, BTreeMap<Hash, BTreeMap<MasternodeId, TxVote>>>,
    pub current_round: Round,
    /// Hash of the finalized vice block
    pub finalized: Option<Hash>,
    pub archived: bool,
}

impl TipState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the voter's vote for its round
    pub fn insert_round_vote(&mut self, vote: RoundVote) {
        self.round_votes
            .entry(vote.round)
            .or_default()
            .insert(vote.voter, vote);
    }

    /// Insert or replace the voter's vote on a transaction in its round.
    /// Returns the replaced vote.
    pub fn insert_tx_vote(&mut self, vote: TxVote) -> Option<TxVote> {
        self.tx_votes
            .entry(vote.round)
            .or_default()
            .entry(vote.choice.subject)
            .or_default()
            .insert(vote.voter, vote)
    }

    /// Stored vote of `voter` on `subject` in `round`
    pub fn find_tx_vote(&self, round: Round, subject: &Hash, voter: &MasternodeId) -> Option<&TxVote> {
        self.tx_votes.get(&round)?.get(subject)?.get(voter)
    }

    /// Remove `vote` if it is still the stored vote for its key
    pub fn remove_tx_vote(&mut self, vote: &TxVote) -> bool {
        let Some(subjects) = self.tx_votes.get_mut(&vote.round) else {
            return false;
        };
        let Some(voters) = subjects.get_mut(&vote.choice.subject) else {
            return false;
        };
        if voters.get(&vote.voter) != Some(vote) {
            return false;
        }

        voters.remove(&vote.voter);
        if voters.is_empty() {
            subjects.remove(&vote.choice.subject);
        }
        if subjects.is_empty() {
            self.tx_votes.remove(&vote.round);
        }
        true
    }

    pub fn has_round_vote(&self, round: Round, voter: &MasternodeId) -> bool {
        self.round_votes
            .get(&round)
            .is_some_and(|votes| votes.contains_key(voter))
    }

    /// Number of `Pass` votes in `round`
    pub fn pass_count(&self, round: Round) -> usize {
        self.round_votes.get(&round).map_or(0, |votes| {
            votes
                .values()
                .filter(|vote| vote.choice.decision == VoteDecision::Pass)
                .count()
        })
    }

    /// Lowest-hash known vice block with at least `quorum` `Yes` votes in `round`
    pub fn yes_quorum_block(&self, round: Round, quorum: usize) -> Option<Hash> {
        let votes = self.round_votes.get(&round)?;

        let mut counts: BTreeMap<Hash, usize> = BTreeMap::new();
        for vote in votes.values() {
            if vote.choice.decision == VoteDecision::Yes {
                *counts.entry(vote.choice.subject).or_default() += 1;
            }
        }

        counts
            .into_iter()
            .find(|(subject, count)| *count >= quorum && self.vice_blocks.contains_key(subject))
            .map(|(subject, _)| subject)
    }

    /// Vice blocks proposed for `round`, lowest hash first
    pub fn vice_blocks_of_round(&self, round: Round) -> impl Iterator<Item = (&Hash, &ViceBlock)> {
        self.vice_blocks
            .iter()
            .filter(move |(_, block)| block.header.round == round)
    }

    /// Transactions this voter voted `Yes` on, in any round
    pub fn own_yes_txs<'a>(&'a self, voter: &'a MasternodeId) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.tx_votes
            .values()
            .flat_map(|subjects| subjects.iter())
            .filter(move |(_, voters)| {
                voters
                    .get(voter)
                    .is_some_and(|vote| vote.choice.decision == VoteDecision::Yes)
            })
            .filter_map(move |(txid, _)| self.txs.get(txid))
    }

    /// Known transactions with at least `quorum` `Yes` votes in one round
    pub fn committed_txs(&self, quorum: usize) -> CommittedTxs {
        let mut committed = CommittedTxs::new();
        for subjects in self.tx_votes.values() {
            for (txid, voters) in subjects {
                let yes = voters
                    .values()
                    .filter(|vote| vote.choice.decision == VoteDecision::Yes)
                    .count();
                if yes >= quorum {
                    if let Some(tx) = self.txs.get(txid) {
                        committed.insert(TxIdSorted(*txid), tx.clone());
                    }
                }
            }
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_core::OutPoint;

    fn mn(byte: u8) -> MasternodeId {
        MasternodeId::new(Hash::new([byte; 32]))
    }

    fn round_vote(voter: u8, round: Round, choice: VoteChoice) -> RoundVote {
        RoundVote {
            tip: Hash::new([0xAA; 32]),
            voter: mn(voter),
            round,
            choice,
        }
    }

    fn tx_vote(voter: u8, round: Round, choice: VoteChoice) -> TxVote {
        TxVote {
            tip: Hash::new([0xAA; 32]),
            voter: mn(voter),
            round,
            choice,
        }
    }

    #[test]
    fn test_round_vote_replaced_per_key() {
        let mut state = TipState::new();
        state.insert_round_vote(round_vote(1, 0, VoteChoice::pass()));
        state.insert_round_vote(round_vote(1, 0, VoteChoice::yes(Hash::new([1; 32]))));

        assert_eq!(state.round_votes[&0].len(), 1);
        assert_eq!(state.pass_count(0), 0);
        assert!(state.has_round_vote(0, &mn(1)));
        assert!(!state.has_round_vote(1, &mn(1)));
    }

    #[test]
    fn test_remove_only_stored_tx_vote() {
        let mut state = TipState::new();
        let txid = Hash::new([7; 32]);
        let first = tx_vote(1, 0, VoteChoice::yes(txid));
        let second = tx_vote(1, 0, VoteChoice::no(txid));

        assert_eq!(state.insert_tx_vote(first.clone()), None);
        assert_eq!(state.insert_tx_vote(second.clone()), Some(first.clone()));
        assert_eq!(state.find_tx_vote(0, &txid, &mn(1)), Some(&second));

        assert!(!state.remove_tx_vote(&first));
        assert!(state.remove_tx_vote(&second));
        assert!(state.tx_votes.is_empty());
    }

    #[test]
    fn test_committed_txs_need_quorum_and_body() {
        let mut state = TipState::new();
        let tx = Transaction::new(vec![OutPoint::new(Hash::new([1; 32]), 0)], vec![]);
        let txid = tx.hash().unwrap();
        let unknown = Hash::new([9; 32]);

        for voter in 1..=3 {
            state.insert_tx_vote(tx_vote(voter, 0, VoteChoice::yes(txid)));
            state.insert_tx_vote(tx_vote(voter, 0, VoteChoice::yes(unknown)));
        }

        assert!(state.committed_txs(3).is_empty());

        state.txs.insert(txid, tx.clone());
        let committed = state.committed_txs(3);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed.get(&TxIdSorted(txid)), Some(&tx));
        assert!(state.committed_txs(4).is_empty());
    }

    #[test]
    fn test_yes_quorum_requires_known_block() {
        let mut state = TipState::new();
        let block = ViceBlock::new(Hash::new([0xAA; 32]), 1, 0, 0, vec![]).unwrap();
        let hash = block.hash().unwrap();

        for voter in 1..=3 {
            state.insert_round_vote(round_vote(voter, 0, VoteChoice::yes(hash)));
        }
        assert_eq!(state.yes_quorum_block(0, 3), None);

        state.vice_blocks.insert(hash, block);
        assert_eq!(state.yes_quorum_block(0, 3), Some(hash));
        assert_eq!(state.yes_quorum_block(1, 3), None);
    }

    #[test]
    fn test_merge_results() {
        let mut first = ConsensusStepResult::default();
        assert!(first.is_empty());

        let mut second = ConsensusStepResult::default();
        second.round_votes.push(round_vote(1, 1, VoteChoice::pass()));
        first.merge(second);
        first.merge(ConsensusStepResult::error(ConsensusError::Other("boom".to_string())));

        assert_eq!(first.round_votes.len(), 1);
        assert!(!first.is_ok());
    }
}
