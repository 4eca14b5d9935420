//! Consensus service wiring
//!
//! Builds the controller from host collaborators, replays persisted state
//! and spawns the background tasks: event loop, heartbeat ticker and
//! inbound dispatcher. One cancellation token stops all of them.

use crate::config::{NodeConfig, StorageBackend};
use crate::NodeResult;
use dpos_consensus::controller::{run_dispatcher, run_event_loop, run_heartbeat_ticker};
use dpos_consensus::memory::{
    MemoryChain, MemoryRegistry, MemoryValidation, MemoryWallet, RecordingSubmitter,
};
use dpos_consensus::{Collaborators, DposController, DposStore, MasternodeRegistry};
use dpos_core::{Hash, MasternodeId, SigningKey};
use dpos_db::{Database, DposDb, MemoryDatabase};
use dpos_network::{InboundMessage, NetworkCommand, NetworkHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Open the configured store
pub fn open_store(config: &NodeConfig) -> NodeResult<Arc<dyn DposStore>> {
    match config.storage {
        StorageBackend::Rocksdb => {
            let path = config.database_path();
            std::fs::create_dir_all(&path)?;
            Ok(Arc::new(DposDb::new(Database::open(&path)?)))
        }
        StorageBackend::Memory => Ok(Arc::new(DposDb::new(MemoryDatabase::new()))),
    }
}

/// Standalone collaborators: a synthetic chain and a fixed masternode set
pub struct Devnet {
    pub collaborators: Collaborators,
    pub network: NetworkHandle,
    pub commands: mpsc::UnboundedReceiver<NetworkCommand>,
    pub chain: Arc<MemoryChain>,
    pub registry: Arc<MemoryRegistry>,
}

impl Devnet {
    /// Masternode `index` of the devnet is seeded from byte `index + 1`
    pub fn masternode_key(index: usize) -> NodeResult<SigningKey> {
        Ok(SigningKey::from_bytes(&[index as u8 + 1; 32])?)
    }

    pub fn build(config: &NodeConfig, store: Arc<dyn DposStore>) -> NodeResult<Self> {
        let chain = Arc::new(MemoryChain::with_blocks(config.devnet.chain_height));
        let registry = Arc::new(MemoryRegistry::new());
        let wallet = Arc::new(MemoryWallet::new());

        for index in 0..config.devnet.masternodes {
            let key = Self::masternode_key(index)?;
            registry.register(
                MasternodeId::new(Hash::new([index as u8 + 1; 32])),
                key.key_id(),
                0,
            );
            registry.add_team_member(key.key_id());
        }

        if let Some(key) = config.operator_signing_key()? {
            let operator = key.key_id();
            if registry.masternodes().iter().all(|info| info.operator != operator) {
                warn!("Operator {} is not a devnet masternode, running passive", operator);
            }
            registry.set_local_operator(Some(operator));
            wallet.add_key(key);
        }

        let (network, commands) = NetworkHandle::new();
        let collaborators = Collaborators {
            chain: chain.clone(),
            registry: registry.clone(),
            wallet,
            store,
            network: Arc::new(network.clone()),
            submitter: Arc::new(RecordingSubmitter::new()),
            validation: Arc::new(MemoryValidation::new()),
        };

        Ok(Self {
            collaborators,
            network,
            commands,
            chain,
            registry,
        })
    }
}

/// Running consensus service
pub struct DposService {
    controller: Arc<DposController>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DposService {
    /// Replay stored state and spawn the background tasks
    pub fn start(controller: Arc<DposController>) -> NodeResult<Self> {
        controller.initialize()?;

        let cancel = CancellationToken::new();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(run_event_loop(controller.clone(), cancel.clone())),
            tokio::spawn(run_heartbeat_ticker(controller.clone(), cancel.clone())),
            tokio::spawn(run_dispatcher(controller.clone(), inbound_rx, cancel.clone())),
        ];

        info!("dPoS service started");
        Ok(Self {
            controller,
            inbound,
            cancel,
            tasks,
        })
    }

    pub fn controller(&self) -> &Arc<DposController> {
        &self.controller
    }

    /// Sender the transport feeds inbound consensus messages into
    pub fn inbound(&self) -> mpsc::UnboundedSender<InboundMessage> {
        self.inbound.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every task and wait for them
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("dPoS task ended abnormally: {}", e);
            }
        }
        info!("dPoS service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_core::{RoundVoteP2p, VoteChoice};
    use dpos_network::{DposMessage, PeerId};
    use std::time::Duration;

    fn devnet_config(operator: Option<usize>) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage = StorageBackend::Memory;
        config.consensus = config.consensus.with_voter_warmup(0);
        config.consensus.tick_interval = 10;
        config.operator_key = operator.map(|index| hex::encode([index as u8 + 1; 32]));
        config
    }

    #[tokio::test]
    async fn test_service_activates_and_stops() {
        let config = devnet_config(Some(3));
        let devnet = Devnet::build(&config, open_store(&config).unwrap()).unwrap();
        let controller =
            Arc::new(DposController::new(config.consensus.clone(), devnet.collaborators).unwrap());

        let service = DposService::start(controller.clone()).unwrap();
        for _ in 0..100 {
            if controller.is_voter() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(controller.is_voter());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_inbound_votes_reach_controller() {
        let config = devnet_config(None);
        let devnet = Devnet::build(&config, open_store(&config).unwrap()).unwrap();
        let tip = {
            use dpos_consensus::ChainView;
            devnet.chain.tip_hash()
        };
        let controller =
            Arc::new(DposController::new(config.consensus.clone(), devnet.collaborators).unwrap());
        let service = DposService::start(controller.clone()).unwrap();

        let mut vote = RoundVoteP2p::new(tip, 0, VoteChoice::pass());
        vote.sign(&Devnet::masternode_key(0).unwrap()).unwrap();
        service
            .inbound()
            .send(InboundMessage::new(PeerId::random(), DposMessage::RoundVote(vote)))
            .unwrap();

        for _ in 0..100 {
            if !controller.list_round_votes().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.list_round_votes().len(), 1);
        assert!(!controller.is_voter());

        service.shutdown().await;
    }
}
