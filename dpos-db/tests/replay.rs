use dpos_consensus::memory::{
    MemoryChain, MemoryRegistry, MemoryValidation, MemoryWallet, RecordingNetwork,
    RecordingSubmitter,
};
use dpos_consensus::{ChainView, Collaborators, DposConfig, DposController, DposStore};
use dpos_core::{Hash, MasternodeId, RoundVoteP2p, SigningKey, VoteChoice};
use dpos_db::{Database, DposDb};
use std::sync::Arc;
use tempfile::TempDir;

fn controller(store: Arc<dyn DposStore>, keys: &[SigningKey]) -> (Arc<DposController>, Hash) {
    let chain = Arc::new(MemoryChain::with_blocks(5));
    let registry = Arc::new(MemoryRegistry::new());
    for (index, key) in keys.iter().enumerate() {
        registry.register(
            MasternodeId::new(Hash::new([index as u8 + 1; 32])),
            key.key_id(),
            0,
        );
        registry.add_team_member(key.key_id());
    }
    let tip = chain.tip_hash();

    let collaborators = Collaborators {
        chain,
        registry,
        wallet: Arc::new(MemoryWallet::new()),
        store,
        network: Arc::new(RecordingNetwork::new()),
        submitter: Arc::new(RecordingSubmitter::new()),
        validation: Arc::new(MemoryValidation::new()),
    };
    let config = DposConfig::with_team_size(keys.len()).with_voter_warmup(0);
    (Arc::new(DposController::new(config, collaborators).unwrap()), tip)
}

#[test]
fn test_restart_replays_votes_from_rocksdb() {
    let dir = TempDir::new().unwrap();
    let keys: Vec<SigningKey> = (1..=4u8)
        .map(|byte| SigningKey::from_bytes(&[byte; 32]).unwrap())
        .collect();

    {
        let store = Arc::new(DposDb::new(Database::open(dir.path()).unwrap()));
        let (controller, tip) = controller(store, &keys);
        for key in &keys[..3] {
            let mut vote = RoundVoteP2p::new(tip, 0, VoteChoice::pass());
            vote.sign(key).unwrap();
            assert!(controller.proceed_round_vote(vote));
        }
        assert_eq!(controller.status().round, 1);
    }

    let store = Arc::new(DposDb::new(Database::open(dir.path()).unwrap()));
    assert_eq!(store.load_round_votes().unwrap().len(), 3);

    let (controller, _) = controller(store, &keys);
    controller.initialize().unwrap();
    assert_eq!(controller.list_round_votes().len(), 3);
    assert_eq!(controller.status().round, 1);
}
