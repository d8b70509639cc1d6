use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::{
    services::{offline_queue::DrainOutcome, sse_events},
    state::SharedState,
};

/// Funnel every drain stimulus into one task: startup, a periodic tick, new enqueues and the
/// link coming back.
pub async fn run(state: SharedState) {
    let queue = state.queue().clone();
    let mut online = state.oracle().subscribe();
    let mut ticker = interval(state.config().drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    drain(&state, "startup").await;

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => "interval",
            _ = queue.enqueued() => "enqueue",
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_online = *online.borrow_and_update();
                sse_events::broadcast_sync_status(&state);
                if !is_online {
                    continue;
                }
                "reconnected"
            }
        };
        drain(&state, trigger).await;
    }

    info!("sync worker stopped");
}

async fn drain(state: &SharedState, trigger: &'static str) {
    let report = state.queue().drain().await;
    if report.outcome == DrainOutcome::Offline {
        return;
    }
    debug!(
        trigger,
        outcome = ?report.outcome,
        submitted = report.submitted,
        dead_lettered = report.dead_lettered,
        remaining = report.remaining,
        "drain pass finished"
    );
    if report.submitted > 0 || report.dead_lettered > 0 {
        sse_events::broadcast_sync_status(state);
    }
}
