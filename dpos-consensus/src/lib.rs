//! Masternode dPoS consensus engine
//!
//! This crate provides the delegated-proof-of-stake layer run by
//! masternodes on top of a proof-of-work chain:
//! - identity resolution of signed votes and heartbeats
//! - the per-tip round-based voter
//! - the masternode liveness tracker
//! - the controller wiring them to network and storage, with its event loops

pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod liveness;
pub mod memory;
pub mod traits;
pub mod voter;

pub use config::DposConfig;
pub use controller::{Collaborators, DposController, DposStatus};
pub use error::{ConsensusError, ConsensusResult};
pub use identity::IdentityResolver;
pub use liveness::{AgeFilter, HeartbeatEntry, HeartbeatTracker};
pub use traits::{
    BlockSubmitter, ChainView, CommittedTxs, DposStore, MasternodeInfo, MasternodeRegistry,
    ValidationCallbacks, Wallet,
};
pub use voter::{ConsensusStepResult, RoundVote, TipState, TxVote, Voter};
