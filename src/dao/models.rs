//! Records exchanged with the remote store. Each one is keyed by a stable id so submitting it
//! twice leaves the remote side unchanged.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::match_state::{
    ActiveTimer, EpochMillis, MatchEvent, MatchState, PerSide, Side, TimeoutKind,
};

/// Full match state, keyed by match id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStateRecord {
    pub match_id: Uuid,
    pub saved_at: EpochMillis,
    pub state: MatchState,
}

/// One event of the match log, keyed by event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub match_id: Uuid,
    pub event: MatchEvent,
}

/// Timer history entry, keyed by timer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub id: Uuid,
    pub match_id: Uuid,
    pub set_number: u8,
    pub kind: TimeoutKind,
    pub side: Option<Side>,
    pub started_at: EpochMillis,
    pub ends_at: EpochMillis,
    pub duration_ms: u64,
    #[serde(default)]
    pub ended_at: Option<EpochMillis>,
}

impl TimerRecord {
    /// Open record for a timer that just started.
    pub fn started(match_id: Uuid, timer: &ActiveTimer) -> Self {
        Self {
            id: timer.id,
            match_id,
            set_number: timer.set_number,
            kind: timer.kind,
            side: timer.side,
            started_at: timer.started_at,
            ends_at: timer.ends_at,
            duration_ms: timer.duration_ms,
            ended_at: None,
        }
    }
}

/// Closing stamp for a timer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerClosure {
    pub match_id: Uuid,
    pub timer_id: Uuid,
    pub ended_at: EpochMillis,
}

/// Coarse lifecycle of a match as seen by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    InProgress,
    Finished,
}

/// Match status summary, keyed by match id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatusUpdate {
    pub match_id: Uuid,
    pub status: MatchStatus,
    pub current_set: u8,
    pub sets_won: PerSide<u8>,
    pub winner: Option<Side>,
    pub updated_at: EpochMillis,
}

impl MatchStatusUpdate {
    /// Summarise `state` at `updated_at`.
    pub fn from_state(state: &MatchState, updated_at: EpochMillis) -> Self {
        Self {
            match_id: state.match_id,
            status: if state.is_game_ended {
                MatchStatus::Finished
            } else {
                MatchStatus::InProgress
            },
            current_set: state.current_set,
            sets_won: state.sets_won,
            winner: state.winner,
            updated_at,
        }
    }
}
