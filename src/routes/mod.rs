use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod matches;
pub mod sse;
pub mod sync;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(matches::router())
        .merge(sync::router())
        .merge(docs::router())
        .with_state(state)
}
