//! dPoS network message types and wire codec

use crate::{NetworkError, NetworkResult};
use dpos_core::crypto;
use dpos_core::{Hash, HeartbeatMessage, RoundVoteP2p, SignedVote, TxVoteP2p, ViceBlock};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};

/// Message size limits
pub mod limits {
    /// Maximum encoded consensus message size (2 MB, a vice block with transactions)
    pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;
    /// Maximum number of inventory entries per announcement or request
    pub const MAX_INV_ENTRIES: usize = 50_000;
}

/// Kind of a relayed consensus payload
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum InvKind {
    ViceBlock,
    RoundVote,
    TxVote,
    Heartbeat,
}

/// Announcement of a payload a node can serve
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Inventory {
    pub kind: InvKind,
    pub hash: Hash,
}

impl Inventory {
    pub fn new(kind: InvKind, hash: Hash) -> Self {
        Self { kind, hash }
    }
}

/// Messages exchanged between masternodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum DposMessage {
    /// Candidate block for the current tip
    ViceBlock(Box<ViceBlock>),
    /// Signed round vote
    RoundVote(RoundVoteP2p),
    /// Signed transaction vote
    TxVote(TxVoteP2p),
    /// Masternode liveness beacon
    Heartbeat(HeartbeatMessage),
    /// Ask a peer for every round vote it knows
    GetRoundVotes,
    /// Ask a peer for the tx votes missing from the given list
    GetTxVotes(Vec<TxVoteP2p>),
    /// Announce payloads available for relay
    Inv(Vec<Inventory>),
    /// Request announced payloads
    GetData(Vec<Inventory>),
}

impl DposMessage {
    /// Inventory entry for relayable payloads; `None` for control messages
    pub fn inventory(&self) -> NetworkResult<Option<Inventory>> {
        let inventory = match self {
            DposMessage::ViceBlock(block) => Inventory::new(InvKind::ViceBlock, block.hash()?),
            DposMessage::RoundVote(vote) => Inventory::new(InvKind::RoundVote, vote.hash()?),
            DposMessage::TxVote(vote) => Inventory::new(InvKind::TxVote, vote.hash()?),
            DposMessage::Heartbeat(message) => Inventory::new(InvKind::Heartbeat, message.hash()?),
            DposMessage::GetRoundVotes
            | DposMessage::GetTxVotes(_)
            | DposMessage::Inv(_)
            | DposMessage::GetData(_) => return Ok(None),
        };
        Ok(Some(inventory))
    }

    /// Wire encoding with size limit
    pub fn encode(&self) -> NetworkResult<Vec<u8>> {
        let bytes = crypto::encode(self)?;
        if bytes.len() > limits::MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                limit: limits::MAX_MESSAGE_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Decode a wire message, rejecting oversized payloads and inventories
    pub fn decode(bytes: &[u8]) -> NetworkResult<Self> {
        if bytes.len() > limits::MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                limit: limits::MAX_MESSAGE_SIZE,
            });
        }

        let message: DposMessage = crypto::decode(bytes)?;
        match &message {
            DposMessage::Inv(entries) | DposMessage::GetData(entries)
                if entries.len() > limits::MAX_INV_ENTRIES =>
            {
                Err(NetworkError::Encoding(format!(
                    "{} inventory entries exceed limit {}",
                    entries.len(),
                    limits::MAX_INV_ENTRIES
                )))
            }
            _ => Ok(message),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            DposMessage::ViceBlock(_) => "vice_block",
            DposMessage::RoundVote(_) => "round_vote",
            DposMessage::TxVote(_) => "tx_vote",
            DposMessage::Heartbeat(_) => "heartbeat",
            DposMessage::GetRoundVotes => "get_round_votes",
            DposMessage::GetTxVotes(_) => "get_tx_votes",
            DposMessage::Inv(_) => "inv",
            DposMessage::GetData(_) => "get_data",
        }
    }
}

/// A message received from a peer, as delivered by the transport
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub peer: PeerId,
    pub message: DposMessage,
}

impl InboundMessage {
    pub fn new(peer: PeerId, message: DposMessage) -> Self {
        Self { peer, message }
    }
}
