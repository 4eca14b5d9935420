//! Peer-facing interface of the consensus layer

use crate::{DposMessage, Inventory, NetworkError, NetworkResult};
use libp2p::PeerId;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the consensus layer needs from the peer-to-peer transport.
///
/// Calls never block; implementations queue work for the transport task.
pub trait PeerNetwork: Send + Sync {
    /// Announce a payload to every connected peer
    fn broadcast_inventory(&self, inventory: Inventory) -> NetworkResult<()>;

    /// Send a message to a single peer
    fn push_message(&self, peer: &PeerId, message: DposMessage) -> NetworkResult<()>;

    /// Currently connected peers
    fn connected_peers(&self) -> Vec<PeerId>;
}

/// Work queued for the transport task
#[derive(Debug)]
pub enum NetworkCommand {
    /// Announce an inventory entry to all peers
    Announce(Inventory),
    /// Deliver a message to one peer
    Send {
        peer: PeerId,
        message: Box<DposMessage>,
    },
}

/// Channel-backed [`PeerNetwork`] handed to the consensus controller
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    /// Channel for sending commands to the transport
    tx: mpsc::UnboundedSender<NetworkCommand>,
    /// Peers the transport reported as connected
    peers: Arc<RwLock<HashSet<PeerId>>>,
}

impl NetworkHandle {
    /// Create a new handle and the receiver the transport drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NetworkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                peers: Arc::new(RwLock::new(HashSet::new())),
            },
            rx,
        )
    }

    /// Record a peer connection
    pub fn peer_connected(&self, peer: PeerId) {
        if self.peers.write().insert(peer) {
            tracing::debug!("dPoS peer connected: {}", peer);
        }
    }

    /// Record a peer disconnection
    pub fn peer_disconnected(&self, peer: &PeerId) {
        if self.peers.write().remove(peer) {
            tracing::debug!("dPoS peer disconnected: {}", peer);
        }
    }

    fn send(&self, command: NetworkCommand) -> NetworkResult<()> {
        self.tx
            .send(command)
            .map_err(|_| NetworkError::ChannelClosed("transport command receiver dropped".to_string()))
    }
}

impl PeerNetwork for NetworkHandle {
    fn broadcast_inventory(&self, inventory: Inventory) -> NetworkResult<()> {
        self.send(NetworkCommand::Announce(inventory))
    }

    fn push_message(&self, peer: &PeerId, message: DposMessage) -> NetworkResult<()> {
        if !self.peers.read().contains(peer) {
            return Err(NetworkError::PeerNotFound(peer.to_string()));
        }
        self.send(NetworkCommand::Send {
            peer: *peer,
            message: Box::new(message),
        })
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.read().iter().copied().collect()
    }
}
