//! Consensus error types

use dpos_core::Hash;
use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug, Clone)]
pub enum ConsensusError {
    /// Malformed or unacceptable vote
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Vice block rejected by block validation
    #[error("Invalid vice block {hash}: {reason}")]
    InvalidBlock { hash: Hash, reason: String },

    /// Transaction rejected by transaction validation
    #[error("Invalid transaction {txid}: {reason}")]
    InvalidTransaction { txid: Hash, reason: String },

    /// Fact addressed to a tip that has been archived
    #[error("Tip {0} is archived")]
    ArchivedTip(Hash),

    /// Stored facts must be replayed before voting starts
    #[error("Voting already enabled; stored facts can no longer be replayed")]
    AlreadyVoter,

    /// The voter reported errors for a step
    #[error("Step rejected with {0} error(s)")]
    StepRejected(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistent store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Encoding, hashing or signing error
    #[error("Core error: {0}")]
    Core(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other error
    #[error("Consensus error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Serialization(err.to_string())
    }
}

impl From<dpos_core::CoreError> for ConsensusError {
    fn from(err: dpos_core::CoreError) -> Self {
        ConsensusError::Core(err.to_string())
    }
}

impl From<dpos_network::NetworkError> for ConsensusError {
    fn from(err: dpos_network::NetworkError) -> Self {
        ConsensusError::Network(err.to_string())
    }
}

impl From<anyhow::Error> for ConsensusError {
    fn from(err: anyhow::Error) -> Self {
        ConsensusError::Other(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
