use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::sync::{DeadLetterDto, SyncStatus},
    error::AppError,
    services::{offline_queue::DrainReport, sync_service},
    state::SharedState,
};

/// Routes exposing the offline queue.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sync/status", get(sync_status))
        .route("/sync/drain", post(drain))
        .route("/sync/dead-letters", get(dead_letters))
        .route("/sync/dead-letters/{id}", delete(discard_dead_letter))
        .route("/sync/dead-letters/{id}/requeue", post(requeue_dead_letter))
}

#[utoipa::path(
    get,
    path = "/sync/status",
    tag = "sync",
    responses((status = 200, description = "Queue length and link state", body = SyncStatus))
)]
pub async fn sync_status(State(state): State<SharedState>) -> Json<SyncStatus> {
    Json(sync_service::status(&state))
}

/// Drain the queue now.
#[utoipa::path(
    post,
    path = "/sync/drain",
    tag = "sync",
    responses((status = 200, description = "Outcome of the drain pass", body = DrainReport))
)]
pub async fn drain(State(state): State<SharedState>) -> Json<DrainReport> {
    Json(sync_service::drain_now(&state).await)
}

#[utoipa::path(
    get,
    path = "/sync/dead-letters",
    tag = "sync",
    responses((status = 200, description = "Operations dropped from the queue", body = [DeadLetterDto]))
)]
pub async fn dead_letters(State(state): State<SharedState>) -> Json<Vec<DeadLetterDto>> {
    Json(sync_service::dead_letters(&state))
}

/// Retry a dropped operation from the tail of the queue.
#[utoipa::path(
    post,
    path = "/sync/dead-letters/{id}/requeue",
    tag = "sync",
    params(("id" = Uuid, Path, description = "Operation identifier")),
    responses(
        (status = 200, description = "Operation queued again", body = SyncStatus),
        (status = 404, description = "No dead letter with this id")
    )
)]
pub async fn requeue_dead_letter(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncStatus>, AppError> {
    Ok(Json(sync_service::requeue_dead_letter(&state, id)?))
}

#[utoipa::path(
    delete,
    path = "/sync/dead-letters/{id}",
    tag = "sync",
    params(("id" = Uuid, Path, description = "Operation identifier")),
    responses(
        (status = 200, description = "Dead letter acknowledged", body = SyncStatus),
        (status = 404, description = "No dead letter with this id")
    )
)]
pub async fn discard_dead_letter(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncStatus>, AppError> {
    Ok(Json(sync_service::discard_dead_letter(&state, id)?))
}
