//! Signed dPoS vote envelopes as exchanged between masternodes
//!
//! An envelope never names its author. The author is whoever can be
//! recovered from `signature` over [`SignedVote::signature_hash`], which makes
//! identity spoofing impossible by construction.

use crate::crypto::{hash_encoded, recover_key_id, SigningKey};
use crate::{CoreResult, Hash, KeyId, Round};
use serde::{Deserialize, Serialize};

/// Domain separation salt mixed into every vote signature hash
pub const VOTE_SALT: [u8; 16] = [
    0x4D, 0x48, 0x7A, 0x52, 0x5D, 0x4D, 0x37, 0x78, 0x42, 0x36, 0x5B, 0x64, 0x44, 0x79, 0x59, 0x4F,
];

/// What a voter says about a subject
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum VoteDecision {
    /// Accept the subject
    Yes,
    /// Abstain: accept current progress and move on
    Pass,
    /// Reject the subject
    No,
}

/// A decision about one subject (vice block hash or transaction id)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct VoteChoice {
    pub subject: Hash,
    pub decision: VoteDecision,
}

impl VoteChoice {
    pub fn yes(subject: Hash) -> Self {
        Self {
            subject,
            decision: VoteDecision::Yes,
        }
    }

    pub fn no(subject: Hash) -> Self {
        Self {
            subject,
            decision: VoteDecision::No,
        }
    }

    /// Pass carries no subject
    pub fn pass() -> Self {
        Self {
            subject: Hash::zero(),
            decision: VoteDecision::Pass,
        }
    }

    /// Yes/No name a subject, Pass must not
    pub fn is_well_formed(&self) -> bool {
        match self.decision {
            VoteDecision::Pass => self.subject.is_zero(),
            VoteDecision::Yes | VoteDecision::No => !self.subject.is_zero(),
        }
    }
}

/// Common view of a signed vote envelope
pub trait SignedVote {
    /// Tip the vote is cast for
    fn tip(&self) -> Hash;

    /// Digest the signature commits to
    fn signature_hash(&self) -> CoreResult<Hash>;

    /// Compact signature bytes
    fn signature(&self) -> &[u8];

    /// Content hash, used for de-duplication and relay
    fn hash(&self) -> CoreResult<Hash>;

    /// Key id of the signer
    fn signer(&self) -> CoreResult<KeyId> {
        recover_key_id(&self.signature_hash()?, self.signature())
    }
}

/// Round vote envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct RoundVoteP2p {
    pub tip: Hash,
    pub round: Round,
    pub choice: VoteChoice,
    pub signature: Vec<u8>,
}

impl RoundVoteP2p {
    /// Unsigned envelope
    pub fn new(tip: Hash, round: Round, choice: VoteChoice) -> Self {
        Self {
            tip,
            round,
            choice,
            signature: Vec::new(),
        }
    }

    /// Sign in place with an operator key
    pub fn sign(&mut self, key: &SigningKey) -> CoreResult<()> {
        self.signature = key.sign_compact(&self.signature_hash()?)?;
        Ok(())
    }
}

impl SignedVote for RoundVoteP2p {
    fn tip(&self) -> Hash {
        self.tip
    }

    fn signature_hash(&self) -> CoreResult<Hash> {
        hash_encoded(&(self.tip, self.round, self.choice, VOTE_SALT))
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn hash(&self) -> CoreResult<Hash> {
        hash_encoded(self)
    }
}

/// Transaction vote envelope; one signature may cover several choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxVoteP2p {
    pub tip: Hash,
    pub round: Round,
    pub choices: Vec<VoteChoice>,
    pub signature: Vec<u8>,
}

impl TxVoteP2p {
    /// Unsigned envelope
    pub fn new(tip: Hash, round: Round, choices: Vec<VoteChoice>) -> Self {
        Self {
            tip,
            round,
            choices,
            signature: Vec::new(),
        }
    }

    /// Sign in place with an operator key
    pub fn sign(&mut self, key: &SigningKey) -> CoreResult<()> {
        self.signature = key.sign_compact(&self.signature_hash()?)?;
        Ok(())
    }
}

impl SignedVote for TxVoteP2p {
    fn tip(&self) -> Hash {
        self.tip
    }

    fn signature_hash(&self) -> CoreResult<Hash> {
        hash_encoded(&(self.tip, self.round, self.choices.clone(), VOTE_SALT))
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn hash(&self) -> CoreResult<Hash> {
        hash_encoded(self)
    }
}
