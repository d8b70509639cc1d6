use tracing::info;
use uuid::Uuid;

use crate::{
    dto::sync::{DeadLetterDto, SyncStatus},
    error::ServiceError,
    services::{offline_queue::DrainReport, sse_events},
    state::SharedState,
};

pub fn status(state: &SharedState) -> SyncStatus {
    let queue = state.queue();
    SyncStatus::new(
        state.oracle().is_online(),
        &queue.pending(),
        queue.dead_letters().len(),
    )
}

/// Run a drain pass now instead of waiting for the next trigger.
pub async fn drain_now(state: &SharedState) -> DrainReport {
    let report = state.queue().drain().await;
    info!(
        outcome = ?report.outcome,
        submitted = report.submitted,
        dead_lettered = report.dead_lettered,
        remaining = report.remaining,
        "manual drain finished"
    );
    sse_events::broadcast_sync_status(state);
    report
}

pub fn dead_letters(state: &SharedState) -> Vec<DeadLetterDto> {
    state
        .queue()
        .dead_letters()
        .into_iter()
        .map(DeadLetterDto::from)
        .collect()
}

/// Put a dead letter back on the queue.
pub fn requeue_dead_letter(state: &SharedState, id: Uuid) -> Result<SyncStatus, ServiceError> {
    if !state.queue().requeue_dead_letter(id) {
        return Err(ServiceError::NotFound(format!("dead letter `{id}`")));
    }
    sse_events::broadcast_sync_status(state);
    Ok(status(state))
}

/// Acknowledge a dead letter without retrying it.
pub fn discard_dead_letter(state: &SharedState, id: Uuid) -> Result<SyncStatus, ServiceError> {
    if !state.queue().discard_dead_letter(id) {
        return Err(ServiceError::NotFound(format!("dead letter `{id}`")));
    }
    sse_events::broadcast_sync_status(state);
    Ok(status(state))
}
