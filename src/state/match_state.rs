//! Match configuration and live match state for a beach-volleyball match.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Milliseconds since the Unix epoch. Every action carries one; the state machine never reads a clock.
pub type EpochMillis = u64;

/// Latest accepted action timestamp (9999-12-31T23:59:59.999Z).
pub const MAX_EPOCH_MILLIS: EpochMillis = 253_402_300_799_999;

/// Highest point target a set may have.
pub const MAX_SET_TARGET: u32 = 99;

/// Highest per-team set score an override may install.
pub const MAX_SET_SCORE: u32 = 999;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as EpochMillis)
        .unwrap_or_default()
}

/// Derive a stable identifier scoped to a match so replays and remote upserts agree on keys.
pub fn stable_id(match_id: Uuid, scope: &str, seq: u64) -> Uuid {
    Uuid::new_v5(&match_id, format!("{scope}:{seq}").as_bytes())
}

/// One of the two teams on court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// First team listed in the match configuration.
    TeamA,
    /// Second team listed in the match configuration.
    TeamB,
}

impl Side {
    /// Both sides in declaration order.
    pub const BOTH: [Side; 2] = [Side::TeamA, Side::TeamB];

    /// The other team.
    pub fn opponent(self) -> Self {
        match self {
            Side::TeamA => Side::TeamB,
            Side::TeamB => Side::TeamA,
        }
    }
}

/// A value tracked once per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSide<T> {
    /// Value for [`Side::TeamA`].
    pub team_a: T,
    /// Value for [`Side::TeamB`].
    pub team_b: T,
}

impl<T> PerSide<T> {
    /// Build a pair from explicit values.
    pub fn new(team_a: T, team_b: T) -> Self {
        Self { team_a, team_b }
    }

    /// Borrow the value for `side`.
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::TeamA => &self.team_a,
            Side::TeamB => &self.team_b,
        }
    }

    /// Mutably borrow the value for `side`.
    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::TeamA => &mut self.team_a,
            Side::TeamB => &mut self.team_b,
        }
    }
}

impl PerSide<u32> {
    /// Cumulative point sum of both sides.
    pub fn sum(&self) -> u32 {
        self.team_a.saturating_add(self.team_b)
    }
}

/// How a point was won, recorded for statistics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PointCategory {
    /// Point won by an attack.
    Attack,
    /// Point won by a block.
    Block,
    /// Point won directly from the serve.
    ServeAce,
    /// Point conceded through an opponent fault.
    OpponentError,
}

/// Kind of timeout a timer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    /// Discretionary timeout requested by one team.
    Team,
    /// Rules-mandated timeout triggered by the cumulative point sum.
    Technical,
}

/// How the opening choices of sets after the first are decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CoinTossMode {
    /// Every following set is configured automatically by alternating the first server.
    Alternate,
    /// Sets alternate automatically, except the deciding set which needs a new toss.
    #[default]
    TossDecidingSet,
    /// Every set opens unconfigured and needs its own toss.
    TossEverySet,
}

/// What the toss winner picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TossChoice {
    /// Toss winner serves first.
    Serve,
    /// Toss winner receives first.
    Receive,
    /// Toss winner picks the court end; the opponent picks serve or receive.
    CourtSide,
}

/// Outcome of a coin toss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CoinToss {
    /// Team that won the toss.
    pub winner: Side,
    /// What the winner chose.
    pub choice: TossChoice,
}

/// Opening choices resulting from a toss (or from alternation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetChoices {
    /// Team serving the first rally of the set.
    pub first_server: Side,
    /// Team occupying the left court end at the start of the set.
    pub left_side: Side,
    /// Serving order per team, as indices into the team roster.
    pub serve_orders: PerSide<Vec<usize>>,
}

/// Per-set record of how the set was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfiguration {
    /// Set this configuration belongs to (1-based).
    pub set_number: u8,
    /// Whether the opening choices are fixed.
    pub is_configured: bool,
    /// Toss outcome, absent when the set was configured by alternation.
    pub coin_toss: Option<CoinToss>,
    /// Opening choices, present once configured.
    pub choices: Option<SetChoices>,
}

impl SetConfiguration {
    /// A fresh configuration awaiting a toss.
    pub fn unconfigured(set_number: u8) -> Self {
        Self {
            set_number,
            is_configured: false,
            coin_toss: None,
            choices: None,
        }
    }
}

/// Team identity and roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    /// Stable team identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Player names, indexed by serve order entries.
    pub players: Vec<String>,
}

/// Technical timeout rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TechnicalTimeoutRule {
    /// Cumulative point sum at which the technical timeout becomes due.
    pub trigger_sum: u32,
    /// Duration of the technical timeout in milliseconds.
    pub duration_ms: u64,
    /// Whether the deciding set is played without a technical timeout.
    #[serde(default)]
    pub skip_deciding_set: bool,
}

/// Scoring format shared by every match started with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFormat {
    /// Points required per set; its length is the maximum number of sets.
    pub points_per_set: Vec<u32>,
    /// Whether a set needs a two-point lead.
    pub two_point_margin: bool,
    /// Cumulative point-sum interval at which teams switch ends, per set (0 disables).
    pub side_switch_every: Vec<u32>,
    /// Optional technical timeout.
    pub technical_timeout: Option<TechnicalTimeoutRule>,
    /// Discretionary timeouts per team per set.
    pub timeouts_per_set: u8,
    /// Duration of a team timeout in milliseconds.
    pub timeout_duration_ms: u64,
    /// How later sets are opened.
    pub coin_toss_mode: CoinTossMode,
}

impl Default for MatchFormat {
    /// Best of three: 21, 21, 15 with two-point lead, ends switched every 7 (5 in the decider).
    fn default() -> Self {
        Self {
            points_per_set: vec![21, 21, 15],
            two_point_margin: true,
            side_switch_every: vec![7, 7, 5],
            technical_timeout: Some(TechnicalTimeoutRule {
                trigger_sum: 21,
                duration_ms: 30_000,
                skip_deciding_set: true,
            }),
            timeouts_per_set: 1,
            timeout_duration_ms: 30_000,
            coin_toss_mode: CoinTossMode::TossDecidingSet,
        }
    }
}

impl MatchFormat {
    /// Check the format can describe a playable match.
    pub fn check(&self) -> Result<(), String> {
        let sets = self.points_per_set.len();
        if sets == 0 || sets > u8::MAX as usize {
            return Err("a match needs between 1 and 255 sets".into());
        }
        if sets % 2 == 0 {
            return Err(format!(
                "set count must be odd so a majority exists (got {sets})"
            ));
        }
        if self.points_per_set.contains(&0) {
            return Err("every set needs a positive point target".into());
        }
        if let Some(target) = self.points_per_set.iter().find(|target| **target > MAX_SET_TARGET) {
            return Err(format!(
                "set target {target} exceeds the maximum of {MAX_SET_TARGET}"
            ));
        }
        if let Some(rule) = self.technical_timeout {
            if rule.trigger_sum == 0 {
                return Err("technical timeout trigger must be positive".into());
            }
        }
        Ok(())
    }
}

/// Immutable description of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfiguration {
    /// Match identifier; namespaces every local and remote record.
    pub match_id: Uuid,
    /// Both teams.
    pub teams: PerSide<TeamRoster>,
    /// Scoring format.
    pub format: MatchFormat,
}

impl MatchConfiguration {
    /// Maximum number of sets.
    pub fn set_count(&self) -> u8 {
        self.format.points_per_set.len() as u8
    }

    /// Sets needed to win the match.
    pub fn sets_to_win(&self) -> u8 {
        self.set_count() / 2 + 1
    }

    /// Point target for `set_number`, falling back to the last declared target.
    pub fn target_for(&self, set_number: u8) -> u32 {
        let index = usize::from(set_number.saturating_sub(1));
        self.format
            .points_per_set
            .get(index)
            .or_else(|| self.format.points_per_set.last())
            .copied()
            .unwrap_or(21)
    }

    /// Side-switch interval for `set_number`, if switches happen in that set.
    pub fn switch_interval_for(&self, set_number: u8) -> Option<u32> {
        let index = usize::from(set_number.saturating_sub(1));
        self.format
            .side_switch_every
            .get(index)
            .or_else(|| self.format.side_switch_every.last())
            .copied()
            .filter(|interval| *interval > 0)
    }

    /// Whether `set_number` is the last possible set.
    pub fn is_deciding_set(&self, set_number: u8) -> bool {
        set_number == self.set_count()
    }

    /// Technical timeout rule in force during `set_number`.
    pub fn technical_timeout_for(&self, set_number: u8) -> Option<TechnicalTimeoutRule> {
        self.format
            .technical_timeout
            .filter(|rule| !(rule.skip_deciding_set && self.is_deciding_set(set_number)))
    }

    /// Roster size for `side`.
    pub fn roster_len(&self, side: Side) -> usize {
        self.teams.get(side).players.len()
    }

    /// Check the configuration can be played.
    pub fn check(&self) -> Result<(), String> {
        self.format.check()?;
        for side in Side::BOTH {
            let team = self.teams.get(side);
            if team.players.is_empty() {
                return Err(format!("team `{}` has no players", team.name));
            }
        }
        if self.teams.team_a.id == self.teams.team_b.id {
            return Err("both sides reference the same team".into());
        }
        Ok(())
    }
}

/// Per-set bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecord {
    /// Set number (1-based).
    pub set_number: u8,
    /// Points per side.
    pub score: PerSide<u32>,
    /// Team timeouts consumed per side.
    pub timeouts_used: PerSide<u8>,
    /// Whether the technical timeout was taken.
    pub technical_timeout_used: bool,
    /// Number of end switches so far.
    pub side_switches: u32,
    /// Winner once the set is closed.
    pub winner: Option<Side>,
    /// Opening configuration.
    pub configuration: SetConfiguration,
}

impl SetRecord {
    /// Open an empty, unconfigured set.
    pub fn open(set_number: u8) -> Self {
        Self {
            set_number,
            score: PerSide::default(),
            timeouts_used: PerSide::default(),
            technical_timeout_used: false,
            side_switches: 0,
            winner: None,
            configuration: SetConfiguration::unconfigured(set_number),
        }
    }
}

/// Timer currently running on court. Expiry is computed at read time only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTimer {
    /// Stable timer identifier.
    pub id: Uuid,
    /// Timeout kind.
    pub kind: TimeoutKind,
    /// Requesting team for team timeouts.
    pub side: Option<Side>,
    /// Set during which the timer runs.
    pub set_number: u8,
    /// Start timestamp.
    pub started_at: EpochMillis,
    /// Scheduled end timestamp.
    pub ends_at: EpochMillis,
    /// Configured duration in milliseconds.
    pub duration_ms: u64,
}

impl ActiveTimer {
    /// Whether the scheduled end has passed at `now`.
    pub fn expired(&self, now: EpochMillis) -> bool {
        now >= self.ends_at
    }

    /// Remaining milliseconds at `now`.
    pub fn remaining_ms(&self, now: EpochMillis) -> u64 {
        self.ends_at.saturating_sub(now)
    }
}

/// Operator correction; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePatch {
    /// Move play forward to this set (never backwards).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_set: Option<u8>,
    /// Replace the opening configuration of the current set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_configuration: Option<SetChoices>,
    /// Replace the current set score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<PerSide<u32>>,
    /// Replace the sets won.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets_won: Option<PerSide<u8>>,
    /// Replace the team timeouts used in the current set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts_used: Option<PerSide<u8>>,
    /// Replace the court-end assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_is_team_a: Option<bool>,
    /// Give the serve to this team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_side: Option<Side>,
    /// Roster index of the serving player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_player: Option<usize>,
    /// End or reopen the match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_game_ended: Option<bool>,
    /// Winner recorded when the patch ends the match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,
}

impl StatePatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Kinds of entries in the match event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A set received its opening choices.
    SetConfigured {
        /// Toss outcome, absent for alternation.
        coin_toss: Option<CoinToss>,
        /// Opening choices.
        choices: SetChoices,
        /// Configured by alternation rather than by an operator.
        automatic: bool,
    },
    /// A rally was won.
    PointScored {
        /// Scoring team.
        side: Side,
        /// Optional statistic category.
        category: Option<PointCategory>,
        /// Set score after the point.
        score: PerSide<u32>,
    },
    /// A timer was opened.
    TimeoutStarted {
        /// Timer identifier.
        timer_id: Uuid,
        /// Requesting team.
        side: Option<Side>,
        /// Timeout kind.
        kind: TimeoutKind,
        /// Scheduled end.
        ends_at: EpochMillis,
    },
    /// The active timer was closed.
    TimeoutEnded {
        /// Timer identifier.
        timer_id: Uuid,
        /// Closed before its scheduled end.
        early: bool,
    },
    /// Teams exchanged court ends.
    SideSwitch {
        /// Court assignment after the switch.
        left_is_team_a: bool,
        /// Point sum that triggered the switch.
        point_sum: u32,
    },
    /// A set was closed.
    SetEnded {
        /// Set winner.
        winner: Side,
        /// Final set score.
        score: PerSide<u32>,
    },
    /// The match was decided.
    MatchEnded {
        /// Match winner.
        winner: Side,
        /// Final sets won.
        sets_won: PerSide<u8>,
    },
    /// Operator correction.
    Override {
        /// Applied patch.
        patch: StatePatch,
        /// Operator-provided justification.
        reason: Option<String>,
    },
}

impl EventKind {
    /// Derived events are regenerated by other transitions and are skipped during replay.
    pub fn is_derived(&self) -> bool {
        match self {
            EventKind::SetConfigured { automatic, .. } => *automatic,
            EventKind::SideSwitch { .. }
            | EventKind::SetEnded { .. }
            | EventKind::MatchEnded { .. } => true,
            EventKind::PointScored { .. }
            | EventKind::TimeoutStarted { .. }
            | EventKind::TimeoutEnded { .. }
            | EventKind::Override { .. } => false,
        }
    }

    /// Short tag used in logs and remote documents.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::SetConfigured { .. } => "set_configured",
            EventKind::PointScored { .. } => "point_scored",
            EventKind::TimeoutStarted { .. } => "timeout_started",
            EventKind::TimeoutEnded { .. } => "timeout_ended",
            EventKind::SideSwitch { .. } => "side_switch",
            EventKind::SetEnded { .. } => "set_ended",
            EventKind::MatchEnded { .. } => "match_ended",
            EventKind::Override { .. } => "override",
        }
    }
}

/// Entry of the append-only match event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Stable identifier derived from the match id and sequence number.
    pub id: Uuid,
    /// Position in the log.
    pub seq: u64,
    /// Set during which the event happened.
    pub set_number: u8,
    /// Timestamp, never earlier than the previous entry.
    pub at: EpochMillis,
    /// Payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Live state of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Match identifier.
    pub match_id: Uuid,
    /// Set in play (1-based).
    pub current_set: u8,
    /// Sets won per side.
    pub sets_won: PerSide<u8>,
    /// One record per opened set.
    pub sets: Vec<SetRecord>,
    /// Team holding the serve.
    pub serving_side: Side,
    /// Roster index of the serving player.
    pub serving_player: usize,
    /// Team that won the last rally.
    pub possession: Option<Side>,
    /// Whether team A occupies the left court end.
    pub left_is_team_a: bool,
    /// Serving order per team for the current set.
    pub serve_order: PerSide<Vec<usize>>,
    /// Position in each serve order of the next player to serve.
    pub next_server_index: PerSide<usize>,
    /// Technical timeout reached and not yet taken.
    pub technical_timeout_due: bool,
    /// Timer running on court, at most one.
    pub active_timer: Option<ActiveTimer>,
    /// Append-only event log.
    pub events: Vec<MatchEvent>,
    /// Whether the match is decided.
    pub is_game_ended: bool,
    /// Match winner once decided.
    pub winner: Option<Side>,
}

impl MatchState {
    /// Fresh state for a match whose first set awaits its toss.
    pub fn new(config: &MatchConfiguration) -> Self {
        Self {
            match_id: config.match_id,
            current_set: 1,
            sets_won: PerSide::default(),
            sets: vec![SetRecord::open(1)],
            serving_side: Side::TeamA,
            serving_player: 0,
            possession: None,
            left_is_team_a: true,
            serve_order: PerSide::new(
                (0..config.roster_len(Side::TeamA)).collect(),
                (0..config.roster_len(Side::TeamB)).collect(),
            ),
            next_server_index: PerSide::default(),
            technical_timeout_due: false,
            active_timer: None,
            events: Vec::new(),
            is_game_ended: false,
            winner: None,
        }
    }

    /// Record of the set in play.
    pub fn current(&self) -> Option<&SetRecord> {
        self.sets.get(usize::from(self.current_set.saturating_sub(1)))
    }

    /// Mutable record of the set in play.
    pub fn current_mut(&mut self) -> Option<&mut SetRecord> {
        self.sets
            .get_mut(usize::from(self.current_set.saturating_sub(1)))
    }

    /// Score of the set in play.
    pub fn current_score(&self) -> PerSide<u32> {
        self.current().map(|set| set.score).unwrap_or_default()
    }

    /// Whether the set in play has its opening choices.
    pub fn is_set_configured(&self) -> bool {
        self.current()
            .is_some_and(|set| set.configuration.is_configured)
    }

    /// Team on the left court end.
    pub fn left_side(&self) -> Side {
        if self.left_is_team_a {
            Side::TeamA
        } else {
            Side::TeamB
        }
    }

    /// Timestamp of the latest event.
    pub fn last_event_at(&self) -> Option<EpochMillis> {
        self.events.last().map(|event| event.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(name: &str) -> TeamRoster {
        TeamRoster {
            id: Uuid::new_v4(),
            name: name.into(),
            players: vec![format!("{name} 1"), format!("{name} 2")],
        }
    }

    #[test]
    fn stable_ids_are_deterministic_per_match() {
        let match_id = Uuid::new_v4();
        assert_eq!(stable_id(match_id, "event", 3), stable_id(match_id, "event", 3));
        assert_ne!(stable_id(match_id, "event", 3), stable_id(match_id, "timer", 3));
        assert_ne!(
            stable_id(match_id, "event", 3),
            stable_id(Uuid::new_v4(), "event", 3)
        );
    }

    #[test]
    fn default_format_is_best_of_three() {
        let config = MatchConfiguration {
            match_id: Uuid::new_v4(),
            teams: PerSide::new(roster("Sand"), roster("Surf")),
            format: MatchFormat::default(),
        };
        assert!(config.check().is_ok());
        assert_eq!(config.sets_to_win(), 2);
        assert_eq!(config.target_for(3), 15);
        assert_eq!(config.switch_interval_for(3), Some(5));
        assert!(config.technical_timeout_for(1).is_some());
        assert!(config.technical_timeout_for(3).is_none());
    }

    #[test]
    fn even_set_counts_are_rejected() {
        let format = MatchFormat {
            points_per_set: vec![21, 21],
            ..MatchFormat::default()
        };
        assert!(format.check().is_err());
    }

    #[test]
    fn oversized_set_targets_are_rejected() {
        let format = MatchFormat {
            points_per_set: vec![21, u32::MAX, 15],
            ..MatchFormat::default()
        };
        assert!(format.check().unwrap_err().contains("exceeds"));

        let at_limit = MatchFormat {
            points_per_set: vec![MAX_SET_TARGET; 3],
            ..MatchFormat::default()
        };
        assert!(at_limit.check().is_ok());
    }

    #[test]
    fn point_sums_saturate() {
        assert_eq!(PerSide::new(u32::MAX, 3).sum(), u32::MAX);
    }

    #[test]
    fn timer_expiry_is_computed_at_read_time() {
        let timer = ActiveTimer {
            id: Uuid::new_v4(),
            kind: TimeoutKind::Team,
            side: Some(Side::TeamA),
            set_number: 1,
            started_at: 1_000,
            ends_at: 31_000,
            duration_ms: 30_000,
        };
        assert!(!timer.expired(30_999));
        assert!(timer.expired(31_000));
        assert_eq!(timer.remaining_ms(21_000), 10_000);
        assert_eq!(timer.remaining_ms(40_000), 0);
    }

    #[test]
    fn events_serialize_with_flat_type_tag() {
        let event = MatchEvent {
            id: Uuid::nil(),
            seq: 0,
            set_number: 1,
            at: 5,
            kind: EventKind::PointScored {
                side: Side::TeamB,
                category: Some(PointCategory::ServeAce),
                score: PerSide::new(0, 1),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "point_scored");
        assert_eq!(json["category"], "serve_ace");
        let back: MatchEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
