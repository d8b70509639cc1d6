use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_epoch_millis,
    state::{
        match_state::{
            ActiveTimer, CoinToss, EpochMillis, MAX_EPOCH_MILLIS, MatchConfiguration, MatchFormat,
            MatchState, PerSide, PointCategory, Side, StatePatch, TimeoutKind,
        },
        statistics::{match_win_probability, set_win_probability},
    },
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Team entry supplied when a match is started.
pub struct TeamInput {
    /// Optional stable team identifier; a fresh one is generated otherwise.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Player names, in roster order.
    #[validate(length(min = 1, max = 4))]
    pub players: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Serving order per team, as roster indices.
pub struct ServeOrders {
    pub team_a: Vec<usize>,
    pub team_b: Vec<usize>,
}

impl From<ServeOrders> for PerSide<Vec<usize>> {
    fn from(value: ServeOrders) -> Self {
        PerSide::new(value.team_a, value.team_b)
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Toss outcome and opening choices of a set.
pub struct SetOpeningRequest {
    pub coin_toss: CoinToss,
    pub first_server: Side,
    pub left_side: Side,
    /// Defaults to roster order for both teams.
    #[serde(default)]
    pub serve_orders: Option<ServeOrders>,
    /// Client timestamp in epoch milliseconds; the server clock is used when absent.
    #[serde(default)]
    #[validate(range(max = MAX_EPOCH_MILLIS))]
    pub at: Option<EpochMillis>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Payload used to start a match on this device.
pub struct StartMatchRequest {
    #[serde(default)]
    pub match_id: Option<Uuid>,
    #[validate(nested)]
    pub team_a: TeamInput,
    #[validate(nested)]
    pub team_b: TeamInput,
    /// Scoring format; the configured default applies when absent.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub format: Option<MatchFormat>,
    #[validate(nested)]
    pub first_set: SetOpeningRequest,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AwardPointRequest {
    pub side: Side,
    #[serde(default)]
    pub category: Option<PointCategory>,
    #[serde(default)]
    #[validate(range(max = MAX_EPOCH_MILLIS))]
    pub at: Option<EpochMillis>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartTimeoutRequest {
    pub kind: TimeoutKind,
    /// Requesting team, required for team timeouts.
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    #[validate(range(max = MAX_EPOCH_MILLIS))]
    pub at: Option<EpochMillis>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct EndTimeoutRequest {
    #[serde(default)]
    #[validate(range(max = MAX_EPOCH_MILLIS))]
    pub at: Option<EpochMillis>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Operator correction of the live state.
pub struct OverrideRequest {
    #[schema(value_type = Object)]
    pub patch: StatePatch,
    #[validate(length(max = 280))]
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    #[validate(range(max = MAX_EPOCH_MILLIS))]
    pub at: Option<EpochMillis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScorePair {
    pub team_a: u32,
    pub team_b: u32,
}

impl From<PerSide<u32>> for ScorePair {
    fn from(value: PerSide<u32>) -> Self {
        Self {
            team_a: value.team_a,
            team_b: value.team_b,
        }
    }
}

impl From<PerSide<u8>> for ScorePair {
    fn from(value: PerSide<u8>) -> Self {
        Self {
            team_a: value.team_a.into(),
            team_b: value.team_b.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ProbabilityPair {
    pub team_a: f64,
    pub team_b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
/// Informational win probabilities, treating every rally as even.
pub struct WinProbabilityDto {
    pub current_set: ProbabilityPair,
    pub match_win: ProbabilityPair,
}

impl WinProbabilityDto {
    pub fn compute(config: &MatchConfiguration, state: &MatchState) -> Self {
        let target = config.target_for(state.current_set);
        let margin = config.format.two_point_margin;
        let score = state.current_score();
        let set_a = set_win_probability(score, target, margin, Side::TeamA);
        let match_a = match_win_probability(config, state, Side::TeamA);
        Self {
            current_set: ProbabilityPair {
                team_a: set_a,
                team_b: 1.0 - set_a,
            },
            match_win: ProbabilityPair {
                team_a: match_a,
                team_b: 1.0 - match_a,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Timer running on court, with expiry evaluated at read time.
pub struct TimerView {
    pub id: Uuid,
    pub kind: TimeoutKind,
    pub side: Option<Side>,
    pub set_number: u8,
    pub started_at: String,
    pub ends_at: String,
    pub remaining_ms: u64,
    pub expired: bool,
}

impl TimerView {
    pub fn at(timer: &ActiveTimer, now: EpochMillis) -> Self {
        Self {
            id: timer.id,
            kind: timer.kind,
            side: timer.side,
            set_number: timer.set_number,
            started_at: format_epoch_millis(timer.started_at),
            ends_at: format_epoch_millis(timer.ends_at),
            remaining_ms: timer.remaining_ms(now),
            expired: timer.expired(now),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Full view of one match as served to the referee console.
pub struct MatchView {
    pub match_id: Uuid,
    #[schema(value_type = Object)]
    pub config: MatchConfiguration,
    #[schema(value_type = Object)]
    pub state: MatchState,
    pub score: ScorePair,
    pub sets_won: ScorePair,
    pub win_probability: WinProbabilityDto,
    pub timer: Option<TimerView>,
    /// Operations of this match still waiting for the remote store.
    pub pending_sync: usize,
    pub last_event_at: Option<String>,
}

impl MatchView {
    pub fn new(
        config: &MatchConfiguration,
        state: &MatchState,
        now: EpochMillis,
        pending_sync: usize,
    ) -> Self {
        Self {
            match_id: config.match_id,
            config: config.clone(),
            state: state.clone(),
            score: state.current_score().into(),
            sets_won: state.sets_won.into(),
            win_probability: WinProbabilityDto::compute(config, state),
            timer: state
                .active_timer
                .as_ref()
                .map(|timer| TimerView::at(timer, now)),
            pending_sync,
            last_event_at: state.last_event_at().map(format_epoch_millis),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Listing entry for a match known to this device.
pub struct MatchSummary {
    pub match_id: Uuid,
    pub team_a: String,
    pub team_b: String,
    pub current_set: u8,
    pub score: ScorePair,
    pub sets_won: ScorePair,
    pub finished: bool,
    pub winner: Option<Side>,
    pub pending_sync: usize,
}

impl MatchSummary {
    pub fn new(config: &MatchConfiguration, state: &MatchState, pending_sync: usize) -> Self {
        Self {
            match_id: config.match_id,
            team_a: config.teams.team_a.name.clone(),
            team_b: config.teams.team_b.name.clone(),
            current_set: state.current_set,
            score: state.current_score().into(),
            sets_won: state.sets_won.into(),
            finished: state.is_game_ended,
            winner: state.winner,
            pending_sync,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Result of a server-side coin toss; informational, nothing is recorded.
pub struct CoinTossResult {
    pub match_id: Uuid,
    pub set_number: u8,
    pub winner: Side,
}
