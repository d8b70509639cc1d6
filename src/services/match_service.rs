use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::matches::{
        AwardPointRequest, CoinTossResult, EndTimeoutRequest, MatchSummary, MatchView,
        OverrideRequest, SetOpeningRequest, StartMatchRequest, StartTimeoutRequest, TeamInput,
    },
    error::ServiceError,
    services::{scoreboard::ScoreboardController, sse_events},
    state::{
        SessionHandle, SharedState,
        match_state::{
            CoinToss, EpochMillis, MatchConfiguration, PerSide, SetChoices, Side, TeamRoster,
            now_millis,
        },
        state_machine::MatchAction,
    },
};

/// Start a new match and register its controller.
pub fn start_match(
    state: &SharedState,
    request: StartMatchRequest,
) -> Result<MatchView, ServiceError> {
    let StartMatchRequest {
        match_id,
        team_a,
        team_b,
        format,
        first_set,
    } = request;
    let config = MatchConfiguration {
        match_id: match_id.unwrap_or_else(Uuid::new_v4),
        teams: PerSide::new(roster(team_a), roster(team_b)),
        format: format.unwrap_or_else(|| state.config().default_format.clone()),
    };
    let match_id = config.match_id;
    let (coin_toss, choices, at) = opening(&config, first_set);

    let view = match state.sessions().entry(match_id) {
        Entry::Occupied(_) => {
            return Err(ServiceError::InvalidState(format!(
                "match `{match_id}` already exists"
            )));
        }
        Entry::Vacant(slot) => {
            let controller = ScoreboardController::start(
                config,
                coin_toss,
                choices,
                at,
                state.snapshots().clone(),
                state.queue().clone(),
            )?;
            let view = view_of(state, &controller);
            slot.insert(Arc::new(Mutex::new(controller)));
            view
        }
    };

    info!(%match_id, "match started");
    sse_events::broadcast_match_updated(state, &view);
    Ok(view)
}

/// Summaries of every match known to this device.
pub async fn list_matches(state: &SharedState) -> Result<Vec<MatchSummary>, ServiceError> {
    let mut ids = state.snapshots().list_matches()?;
    let live: Vec<Uuid> = state.sessions().iter().map(|entry| *entry.key()).collect();
    for id in live {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut summaries = Vec::with_capacity(ids.len());
    for id in ids {
        let handle = state.sessions().get(&id).map(|entry| entry.value().clone());
        let pending = state.queue().pending_for(id);
        match handle {
            Some(handle) => {
                let controller = handle.lock().await;
                summaries.push(MatchSummary::new(
                    controller.config(),
                    controller.state(),
                    pending,
                ));
            }
            None => match state.snapshots().load(id) {
                Ok(Some(snapshot)) => {
                    summaries.push(MatchSummary::new(&snapshot.config, &snapshot.state, pending))
                }
                Ok(None) => {}
                Err(err) => warn!(match_id = %id, error = %err, "skipping unreadable match"),
            },
        }
    }
    Ok(summaries)
}

/// Resume every match stored on this device, rebuilding remote operations a crash left unqueued.
/// Unreadable matches are logged and skipped.
pub fn restore_sessions(state: &SharedState) -> Result<usize, ServiceError> {
    let mut restored = 0;
    for match_id in state.snapshots().list_matches()? {
        match session(state, match_id) {
            Ok(_) => restored += 1,
            Err(err) => warn!(%match_id, error = %err, "cannot restore match session"),
        }
    }
    Ok(restored)
}

/// Current view of one match.
pub async fn match_view(state: &SharedState, match_id: Uuid) -> Result<MatchView, ServiceError> {
    let handle = session(state, match_id)?;
    let controller = handle.lock().await;
    Ok(view_of(state, &controller))
}

pub async fn award_point(
    state: &SharedState,
    match_id: Uuid,
    request: AwardPointRequest,
) -> Result<MatchView, ServiceError> {
    let action = MatchAction::AwardPoint {
        side: request.side,
        category: request.category,
        at: timestamp(request.at),
    };
    dispatch(state, match_id, action).await
}

pub async fn start_timeout(
    state: &SharedState,
    match_id: Uuid,
    request: StartTimeoutRequest,
) -> Result<MatchView, ServiceError> {
    let action = MatchAction::StartTimeout {
        side: request.side,
        kind: request.kind,
        at: timestamp(request.at),
    };
    dispatch(state, match_id, action).await
}

pub async fn end_timeout(
    state: &SharedState,
    match_id: Uuid,
    request: EndTimeoutRequest,
) -> Result<MatchView, ServiceError> {
    let action = MatchAction::EndTimeout {
        at: timestamp(request.at),
    };
    dispatch(state, match_id, action).await
}

/// Record the toss and opening choices of a set that opened unconfigured.
pub async fn configure_set(
    state: &SharedState,
    match_id: Uuid,
    set_number: u8,
    request: SetOpeningRequest,
) -> Result<MatchView, ServiceError> {
    let handle = session(state, match_id)?;
    let mut controller = handle.lock().await;
    let (coin_toss, choices, at) = opening(controller.config(), request);
    controller.dispatch(MatchAction::ConfigureSet {
        set_number,
        coin_toss,
        choices,
        at,
    })?;
    debug!(%match_id, set_number, "set configured");
    let view = view_of(state, &controller);
    drop(controller);

    sse_events::broadcast_match_updated(state, &view);
    Ok(view)
}

pub async fn override_state(
    state: &SharedState,
    match_id: Uuid,
    request: OverrideRequest,
) -> Result<MatchView, ServiceError> {
    info!(%match_id, reason = ?request.reason, "applying operator override");
    let action = MatchAction::OverrideState {
        patch: request.patch,
        reason: request.reason,
        at: timestamp(request.at),
    };
    dispatch(state, match_id, action).await
}

/// Flip a coin for the set in play. Nothing is recorded; the result feeds a later configure call.
pub async fn coin_toss(state: &SharedState, match_id: Uuid) -> Result<CoinTossResult, ServiceError> {
    let handle = session(state, match_id)?;
    let set_number = handle.lock().await.state().current_set;
    let winner = if rand::random::<bool>() {
        Side::TeamA
    } else {
        Side::TeamB
    };
    debug!(%match_id, set_number, ?winner, "coin tossed");
    Ok(CoinTossResult {
        match_id,
        set_number,
        winner,
    })
}

async fn dispatch(
    state: &SharedState,
    match_id: Uuid,
    action: MatchAction,
) -> Result<MatchView, ServiceError> {
    let handle = session(state, match_id)?;
    let mut controller = handle.lock().await;
    if let Err(err) = controller.dispatch(action) {
        debug!(%match_id, error = %err, "action rejected");
        return Err(err.into());
    }
    let view = view_of(state, &controller);
    drop(controller);

    sse_events::broadcast_match_updated(state, &view);
    Ok(view)
}

/// Live controller for `match_id`, resumed from the local snapshot on first access.
fn session(state: &SharedState, match_id: Uuid) -> Result<SessionHandle, ServiceError> {
    if let Some(entry) = state.sessions().get(&match_id) {
        return Ok(entry.value().clone());
    }
    let controller =
        ScoreboardController::resume(match_id, state.snapshots().clone(), state.queue().clone())?;
    info!(%match_id, "match session restored from local snapshot");
    let handle = state
        .sessions()
        .entry(match_id)
        .or_insert_with(|| Arc::new(Mutex::new(controller)))
        .value()
        .clone();
    Ok(handle)
}

fn view_of(state: &SharedState, controller: &ScoreboardController) -> MatchView {
    let pending = state.queue().pending_for(controller.match_id());
    MatchView::new(controller.config(), controller.state(), now_millis(), pending)
}

fn roster(team: TeamInput) -> TeamRoster {
    TeamRoster {
        id: team.id.unwrap_or_else(Uuid::new_v4),
        name: team.name,
        players: team.players,
    }
}

fn opening(
    config: &MatchConfiguration,
    request: SetOpeningRequest,
) -> (CoinToss, SetChoices, EpochMillis) {
    let serve_orders = request.serve_orders.map(Into::into).unwrap_or_else(|| {
        PerSide::new(
            (0..config.roster_len(Side::TeamA)).collect(),
            (0..config.roster_len(Side::TeamB)).collect(),
        )
    });
    let choices = SetChoices {
        first_server: request.first_server,
        left_side: request.left_side,
        serve_orders,
    };
    (request.coin_toss, choices, timestamp(request.at))
}

fn timestamp(at: Option<EpochMillis>) -> EpochMillis {
    at.unwrap_or_else(now_millis)
}
