use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{matches::MatchView, sse::ServerEvent, sync::SyncStatus},
    state::SharedState,
};

const EVENT_MATCH_UPDATED: &str = "match.updated";
const EVENT_SYNC_STATUS: &str = "sync.status";

/// Broadcast the latest view of a match after an accepted action.
pub fn broadcast_match_updated(state: &SharedState, view: &MatchView) {
    send_public_event(state, EVENT_MATCH_UPDATED, view);
}

/// Broadcast the queue length and link state.
pub fn broadcast_sync_status(state: &SharedState) {
    let queue = state.queue();
    let status = SyncStatus::new(
        state.oracle().is_online(),
        &queue.pending(),
        queue.dead_letters().len(),
    );
    send_public_event(state, EVENT_SYNC_STATUS, &status);
}

fn send_public_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.public_sse().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialise SSE payload"),
    }
}
