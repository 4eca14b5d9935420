//! dPoS consensus networking layer
//!
//! Consensus message types, the inventory relay cache and the peer-facing
//! interface the consensus controller talks to. The transport itself lives
//! with the host node; it drains [`NetworkCommand`]s and feeds
//! [`InboundMessage`]s back.

pub mod error;
pub mod handle;
pub mod message;
pub mod relay;

pub use error::{NetworkError, NetworkResult};
pub use handle::{NetworkCommand, NetworkHandle, PeerNetwork};
pub use message::{DposMessage, InboundMessage, InvKind, Inventory};
pub use relay::RelayCache;

/// Re-export commonly used types
pub use libp2p::PeerId;
