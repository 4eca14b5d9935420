mod common;

use common::Harness;
use dpos_consensus::controller::{run_dispatcher, run_event_loop, run_heartbeat_ticker};
use dpos_consensus::DposConfig;
use dpos_core::VoteChoice;
use dpos_network::{DposMessage, InboundMessage, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn fast_harness() -> Harness {
    let mut config = DposConfig::with_team_size(4).with_voter_warmup(0);
    config.tick_interval = 10;
    Harness::build(config, Arc::new(dpos_consensus::memory::MemoryStore::new()))
}

#[tokio::test]
async fn test_event_loop_activates_voter() {
    let h = fast_harness();
    h.chain.set_initial_block_download(true);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_event_loop(h.controller.clone(), cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!h.controller.is_voter());

    h.chain.set_initial_block_download(false);
    assert!(wait_until(|| h.controller.is_voter()).await);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_ticker_posts_own_heartbeat() {
    let h = fast_harness();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_heartbeat_ticker(h.controller.clone(), cancel.clone()));

    let heartbeats = h.controller.heartbeats().clone();
    assert!(wait_until(|| !heartbeats.list_all().is_empty()).await);

    let own = common::mn(4);
    assert_eq!(heartbeats.list_all()[0].masternode, own);
    assert_eq!(h.network.announced().len(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_dispatcher_drains_channel() {
    let h = fast_harness();
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_dispatcher(h.controller.clone(), rx, cancel.clone()));

    let vote = h.round_vote(0, 0, VoteChoice::pass());
    tx.send(InboundMessage::new(PeerId::random(), DposMessage::RoundVote(vote.clone())))
        .unwrap();

    let controller = h.controller.clone();
    assert!(wait_until(|| controller.list_round_votes() == vec![vote.clone()]).await);

    // Closing the channel stops the dispatcher
    drop(tx);
    task.await.unwrap();
    assert!(!cancel.is_cancelled());
}
