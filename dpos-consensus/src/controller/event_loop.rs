//! Background loops driving the controller

use super::DposController;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tick the controller until cancelled.
///
/// Each tick may activate voting; every reconcile interval the connected
/// peers are asked to resend votes we may have missed.
pub async fn run_event_loop(controller: Arc<DposController>, cancel: CancellationToken) {
    let tick = controller.config().tick_interval_as_duration();
    let reconcile_interval = controller.config().reconcile_interval_as_duration();
    let mut last_reconcile = Instant::now();

    info!(
        tick_interval_ms = tick.as_millis() as u64,
        reconcile_interval_secs = reconcile_interval.as_secs(),
        "dPoS event loop started"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let now = Instant::now();
        if controller.activate_if_ready(now) {
            info!("dPoS voter activated");
        }

        if now.duration_since(last_reconcile) >= reconcile_interval {
            controller.reconcile_with_peers();
            last_reconcile = now;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }
    }

    info!("dPoS event loop stopped");
}

/// Post a heartbeat every two minimal periods while holding an operator key
pub async fn run_heartbeat_ticker(controller: Arc<DposController>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match controller.identity().masternode_key() {
            Some(key) => {
                if !controller.heartbeats().post_message(&key, None) {
                    debug!("Own heartbeat not accepted");
                }
            }
            None => debug!("No operator key, skipping heartbeat"),
        }

        let period = controller.heartbeats().min_period() * 2;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }

    debug!("Heartbeat ticker stopped");
}
