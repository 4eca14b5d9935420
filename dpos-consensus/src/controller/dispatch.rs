//! Routing of inbound consensus messages to the controller

use super::DposController;
use dpos_network::{DposMessage, InboundMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hand one inbound message to the matching controller operation
pub fn dispatch(controller: &DposController, inbound: InboundMessage) {
    let InboundMessage { peer, message } = inbound;
    debug!("dPoS {} from {}", message.name(), peer);

    match message {
        DposMessage::ViceBlock(block) => {
            controller.proceed_vice_block(*block);
        }
        DposMessage::RoundVote(vote) => {
            controller.proceed_round_vote(vote);
        }
        DposMessage::TxVote(vote) => {
            controller.proceed_tx_vote(vote);
        }
        DposMessage::Heartbeat(heartbeat) => {
            controller.heartbeats().relay_message(&heartbeat);
        }
        DposMessage::GetRoundVotes => controller.handle_get_round_votes(&peer),
        DposMessage::GetTxVotes(theirs) => controller.handle_get_tx_votes(&peer, &theirs),
        DposMessage::Inv(inventory) => controller.handle_inventory(&peer, &inventory),
        DposMessage::GetData(inventory) => controller.serve_get_data(&peer, &inventory),
    }
}

/// Drain inbound messages until cancelled or the transport goes away
pub async fn run_dispatcher(
    controller: Arc<DposController>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    cancel: CancellationToken,
) {
    info!("dPoS dispatcher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => dispatch(&controller, message),
                None => break,
            },
        }
    }
    info!("dPoS dispatcher stopped");
}
