//! Core dPoS data structures
//!
//! This crate provides the data model shared by the consensus, network and
//! storage crates:
//! - Basic types (Hash, KeyId, MasternodeId, Round)
//! - Transactions and (vice) blocks
//! - Signed round/transaction vote envelopes and heartbeats
//! - Hashing and compact recoverable signatures

pub mod block;
pub mod crypto;
pub mod error;
pub mod heartbeat;
pub mod transaction;
pub mod types;
pub mod vote;

// Re-export commonly used types
pub use block::*;
pub use crypto::{SigningKey, COMPACT_SIGNATURE_SIZE};
pub use error::*;
pub use heartbeat::*;
pub use transaction::*;
pub use types::*;
pub use vote::*;
