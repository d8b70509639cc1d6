use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{
        AwardPointRequest, CoinTossResult, EndTimeoutRequest, MatchSummary, MatchView,
        OverrideRequest, SetOpeningRequest, StartMatchRequest, StartTimeoutRequest,
    },
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Routes driving live matches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", post(start_match).get(list_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/points", post(award_point))
        .route("/matches/{id}/timeouts", post(start_timeout))
        .route("/matches/{id}/timeouts/end", post(end_timeout))
        .route("/matches/{id}/sets/{set}/configure", post(configure_set))
        .route("/matches/{id}/override", post(override_state))
        .route("/matches/{id}/coin-toss", post(coin_toss))
}

/// Start a match and configure its first set.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = StartMatchRequest,
    responses(
        (status = 200, description = "Match started", body = MatchView),
        (status = 400, description = "Invalid configuration or opening choices"),
        (status = 409, description = "Match already exists")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartMatchRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::start_match(&state, payload)?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Matches known to this device", body = [MatchSummary]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
) -> Result<Json<Vec<MatchSummary>>, AppError> {
    let summaries = match_service::list_matches(&state).await?;
    Ok(Json(summaries))
}

#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Current match view", body = MatchView),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::match_view(&state, id).await?;
    Ok(Json(view))
}

/// Award the rally to a team.
#[utoipa::path(
    post,
    path = "/matches/{id}/points",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = AwardPointRequest,
    responses(
        (status = 200, description = "Point recorded", body = MatchView),
        (status = 409, description = "Point not allowed in the current state")
    )
)]
pub async fn award_point(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AwardPointRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::award_point(&state, id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/timeouts",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = StartTimeoutRequest,
    responses(
        (status = 200, description = "Timer started", body = MatchView),
        (status = 409, description = "Timeout not allowed in the current state")
    )
)]
pub async fn start_timeout(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StartTimeoutRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::start_timeout(&state, id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/timeouts/end",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = EndTimeoutRequest,
    responses(
        (status = 200, description = "Timer closed", body = MatchView),
        (status = 409, description = "No timer is running")
    )
)]
pub async fn end_timeout(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EndTimeoutRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::end_timeout(&state, id, payload).await?;
    Ok(Json(view))
}

/// Record the toss of a set that opened unconfigured.
#[utoipa::path(
    post,
    path = "/matches/{id}/sets/{set}/configure",
    tag = "matches",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("set" = u8, Path, description = "Set number, must be the set in play")
    ),
    request_body = SetOpeningRequest,
    responses(
        (status = 200, description = "Set configured", body = MatchView),
        (status = 409, description = "Set already configured or not in play")
    )
)]
pub async fn configure_set(
    State(state): State<SharedState>,
    Path((id, set)): Path<(Uuid, u8)>,
    Valid(Json(payload)): Valid<Json<SetOpeningRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::configure_set(&state, id, set, payload).await?;
    Ok(Json(view))
}

/// Apply an operator correction.
#[utoipa::path(
    post,
    path = "/matches/{id}/override",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = OverrideRequest,
    responses(
        (status = 200, description = "Correction applied", body = MatchView),
        (status = 409, description = "Correction would break the match structure")
    )
)]
pub async fn override_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<OverrideRequest>>,
) -> Result<Json<MatchView>, AppError> {
    let view = match_service::override_state(&state, id, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/coin-toss",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Random toss winner", body = CoinTossResult))
)]
pub async fn coin_toss(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CoinTossResult>, AppError> {
    let result = match_service::coin_toss(&state, id).await?;
    Ok(Json(result))
}
