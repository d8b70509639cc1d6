use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the remote store is reachable, logging when scoring runs offline.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let pending = state.queue().len();
    if state.is_degraded() {
        warn!(pending, "remote store unreachable (offline scoring)");
        HealthResponse::degraded(pending)
    } else {
        HealthResponse::ok(pending)
    }
}
