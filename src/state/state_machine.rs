use thiserror::Error;

use crate::state::match_state::{
    ActiveTimer, CoinToss, CoinTossMode, EpochMillis, EventKind, MatchConfiguration, MatchEvent,
    MAX_SET_SCORE, MatchState, PerSide, PointCategory, SetChoices, SetRecord, Side, StatePatch,
    TimeoutKind, TossChoice, stable_id,
};

/// Actions the referee console can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchAction {
    /// A team won a rally.
    AwardPoint {
        /// Scoring team.
        side: Side,
        /// Optional statistic category.
        category: Option<PointCategory>,
        /// Action timestamp.
        at: EpochMillis,
    },
    /// Open a timeout timer.
    StartTimeout {
        /// Requesting team, required for team timeouts.
        side: Option<Side>,
        /// Timeout kind.
        kind: TimeoutKind,
        /// Action timestamp.
        at: EpochMillis,
    },
    /// Close the active timer.
    EndTimeout {
        /// Action timestamp.
        at: EpochMillis,
    },
    /// Operator-authorised correction.
    OverrideState {
        /// Fields to replace.
        patch: StatePatch,
        /// Justification kept in the event log.
        reason: Option<String>,
        /// Action timestamp.
        at: EpochMillis,
    },
    /// Fix the opening choices of the current set.
    ConfigureSet {
        /// Set to configure; must be the set in play.
        set_number: u8,
        /// Toss outcome.
        coin_toss: CoinToss,
        /// Resulting choices.
        choices: SetChoices,
        /// Action timestamp.
        at: EpochMillis,
    },
}

impl MatchAction {
    /// Rebuild the action that produced a non-derived event.
    pub fn from_event(event: &MatchEvent) -> Option<Self> {
        let at = event.at;
        let action = match &event.kind {
            EventKind::SetConfigured {
                coin_toss: Some(coin_toss),
                choices,
                automatic: false,
            } => MatchAction::ConfigureSet {
                set_number: event.set_number,
                coin_toss: *coin_toss,
                choices: choices.clone(),
                at,
            },
            EventKind::PointScored { side, category, .. } => MatchAction::AwardPoint {
                side: *side,
                category: *category,
                at,
            },
            EventKind::TimeoutStarted { side, kind, .. } => MatchAction::StartTimeout {
                side: *side,
                kind: *kind,
                at,
            },
            EventKind::TimeoutEnded { .. } => MatchAction::EndTimeout { at },
            EventKind::Override { patch, reason } => MatchAction::OverrideState {
                patch: patch.clone(),
                reason: reason.clone(),
                at,
            },
            _ => return None,
        };
        Some(action)
    }
}

/// Reason an action was refused. Rejections are never persisted or queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// The match is already decided.
    #[error("the match has already ended")]
    MatchEnded,
    /// The set in play already has a winner.
    #[error("set {set} is already closed")]
    SetClosed {
        /// Closed set.
        set: u8,
    },
    /// Points cannot be scored before the toss.
    #[error("set {set} has not been configured yet")]
    SetNotConfigured {
        /// Unconfigured set.
        set: u8,
    },
    /// Only one timer may run at a time, and rallies wait for it to end.
    #[error("a timer is already running")]
    TimerActive,
    /// There is no timer to close.
    #[error("no timer is running")]
    NoActiveTimer,
    /// The team has no timeout left in this set.
    #[error("{side:?} has used all {allowed} timeout(s) for this set")]
    TimeoutsExhausted {
        /// Requesting team.
        side: Side,
        /// Allotment per set.
        allowed: u8,
    },
    /// A team timeout needs a requesting team.
    #[error("a team timeout requires a side")]
    MissingSide,
    /// No technical timeout exists in this set.
    #[error("set {set} has no technical timeout")]
    TechnicalTimeoutUnavailable {
        /// Set in play.
        set: u8,
    },
    /// The technical timeout was already taken.
    #[error("the technical timeout of set {set} was already used")]
    TechnicalTimeoutUsed {
        /// Set in play.
        set: u8,
    },
    /// The set already has its opening choices.
    #[error("set {set} is already configured")]
    AlreadyConfigured {
        /// Configured set.
        set: u8,
    },
    /// Only the set in play can be configured.
    #[error("cannot configure set {got} while set {expected} is in play")]
    WrongSet {
        /// Set in play.
        expected: u8,
        /// Requested set.
        got: u8,
    },
    /// A serve order is not a permutation of the roster.
    #[error("invalid serve order for {side:?}: {reason}")]
    InvalidServeOrder {
        /// Offending team.
        side: Side,
        /// What is wrong with it.
        reason: String,
    },
    /// Choices contradict the toss.
    #[error("choices contradict the coin toss: {0}")]
    InconsistentChoices(String),
    /// An override would break a structural invariant.
    #[error("override rejected: {0}")]
    StructuralViolation(String),
    /// An override with nothing to change.
    #[error("override patch is empty")]
    EmptyOverride,
}

/// A replayed event was refused by the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event #{seq} cannot be replayed: {reason}")]
pub struct ReplayError {
    /// Sequence number of the refused event.
    pub seq: u64,
    /// Rejection raised by the machine.
    pub reason: RejectionReason,
}

/// Pure transition function for one match.
#[derive(Debug, Clone, Copy)]
pub struct MatchStateMachine<'a> {
    config: &'a MatchConfiguration,
}

impl<'a> MatchStateMachine<'a> {
    /// Bind the machine to a match configuration.
    pub fn new(config: &'a MatchConfiguration) -> Self {
        Self { config }
    }

    /// Compute the state following `action`, leaving `state` untouched.
    pub fn apply(&self, state: &MatchState, action: MatchAction) -> Result<MatchState, RejectionReason> {
        let mut next = state.clone();
        self.apply_in_place(&mut next, action)?;
        Ok(next)
    }

    /// Rebuild a state by folding the non-derived events of a log over a fresh state.
    pub fn replay(&self, events: &[MatchEvent]) -> Result<MatchState, ReplayError> {
        let mut state = MatchState::new(self.config);
        for event in events.iter().filter(|event| !event.kind.is_derived()) {
            let Some(action) = MatchAction::from_event(event) else {
                continue;
            };
            let mut next = state.clone();
            self.apply_in_place(&mut next, action)
                .map_err(|reason| ReplayError {
                    seq: event.seq,
                    reason,
                })?;
            state = next;
        }
        Ok(state)
    }

    /// Mutate `state` in place. On error `state` may be partially modified and must be discarded.
    fn apply_in_place(&self, state: &mut MatchState, action: MatchAction) -> Result<(), RejectionReason> {
        match action {
            MatchAction::AwardPoint { side, category, at } => {
                self.award_point(state, side, category, at)
            }
            MatchAction::StartTimeout { side, kind, at } => {
                self.start_timeout(state, side, kind, at)
            }
            MatchAction::EndTimeout { at } => end_timeout(state, at),
            MatchAction::OverrideState { patch, reason, at } => {
                self.override_state(state, patch, reason, at)
            }
            MatchAction::ConfigureSet {
                set_number,
                coin_toss,
                choices,
                at,
            } => self.configure_set(state, set_number, coin_toss, choices, at),
        }
    }

    fn award_point(
        &self,
        state: &mut MatchState,
        side: Side,
        category: Option<PointCategory>,
        at: EpochMillis,
    ) -> Result<(), RejectionReason> {
        if state.is_game_ended {
            return Err(RejectionReason::MatchEnded);
        }
        let set_number = state.current_set;
        let (closed, configured) = state
            .current()
            .map(|set| (set.winner.is_some(), set.configuration.is_configured))
            .unwrap_or((true, false));
        if closed {
            return Err(RejectionReason::SetClosed { set: set_number });
        }
        if !configured {
            return Err(RejectionReason::SetNotConfigured { set: set_number });
        }
        if state.active_timer.is_some() {
            return Err(RejectionReason::TimerActive);
        }

        let record = current_record(state)?;
        let before = record.score.sum();
        let points = record.score.get_mut(side);
        *points = points.saturating_add(1);
        let score = record.score;
        let after = score.sum();
        push_event(
            state,
            at,
            EventKind::PointScored {
                side,
                category,
                score,
            },
        );

        state.possession = Some(side);
        if state.serving_side != side {
            let player = advance_server(state, side);
            state.serving_side = side;
            state.serving_player = player;
        }

        if let Some(winner) = self.set_winner(set_number, score) {
            return self.close_set(state, winner, score, at);
        }

        if let Some(interval) = self.config.switch_interval_for(set_number) {
            let reached = after / interval;
            let record = current_record(state)?;
            if after % interval == 0 && record.side_switches < reached {
                record.side_switches += 1;
                state.left_is_team_a = !state.left_is_team_a;
                let left_is_team_a = state.left_is_team_a;
                push_event(
                    state,
                    at,
                    EventKind::SideSwitch {
                        left_is_team_a,
                        point_sum: after,
                    },
                );
            }
        }

        if let Some(rule) = self.config.technical_timeout_for(set_number) {
            let used = current_record(state)?.technical_timeout_used;
            if !used && !state.technical_timeout_due && before < rule.trigger_sum && after >= rule.trigger_sum {
                state.technical_timeout_due = true;
            }
        }

        Ok(())
    }

    fn set_winner(&self, set_number: u8, score: PerSide<u32>) -> Option<Side> {
        let target = self.config.target_for(set_number);
        Side::BOTH.into_iter().find(|side| {
            let own = *score.get(*side);
            let other = *score.get(side.opponent());
            own >= target && (!self.config.format.two_point_margin || own >= other.saturating_add(2))
        })
    }

    fn close_set(
        &self,
        state: &mut MatchState,
        winner: Side,
        score: PerSide<u32>,
        at: EpochMillis,
    ) -> Result<(), RejectionReason> {
        current_record(state)?.winner = Some(winner);
        *state.sets_won.get_mut(winner) += 1;
        state.technical_timeout_due = false;
        push_event(state, at, EventKind::SetEnded { winner, score });

        if *state.sets_won.get(winner) >= self.config.sets_to_win()
            || state.current_set >= self.config.set_count()
        {
            state.is_game_ended = true;
            state.winner = Some(winner);
            let sets_won = state.sets_won;
            push_event(state, at, EventKind::MatchEnded { winner, sets_won });
            return Ok(());
        }

        self.open_next_set(state, at);
        Ok(())
    }

    fn open_next_set(&self, state: &mut MatchState, at: EpochMillis) {
        let previous = state
            .current()
            .and_then(|set| set.configuration.choices.clone());
        let next = state.current_set + 1;
        state.sets.push(SetRecord::open(next));
        state.current_set = next;
        state.possession = None;

        let automatic = match self.config.format.coin_toss_mode {
            CoinTossMode::Alternate => true,
            CoinTossMode::TossDecidingSet => !self.config.is_deciding_set(next),
            CoinTossMode::TossEverySet => false,
        };
        let Some(previous) = previous.filter(|_| automatic) else {
            return;
        };

        let choices = SetChoices {
            first_server: previous.first_server.opponent(),
            left_side: previous.left_side.opponent(),
            serve_orders: previous.serve_orders,
        };
        install_choices(state, None, &choices);
        push_event(
            state,
            at,
            EventKind::SetConfigured {
                coin_toss: None,
                choices,
                automatic: true,
            },
        );
    }

    fn start_timeout(
        &self,
        state: &mut MatchState,
        side: Option<Side>,
        kind: TimeoutKind,
        at: EpochMillis,
    ) -> Result<(), RejectionReason> {
        if state.is_game_ended {
            return Err(RejectionReason::MatchEnded);
        }
        if state.active_timer.is_some() {
            return Err(RejectionReason::TimerActive);
        }
        let set_number = state.current_set;
        let allowed = self.config.format.timeouts_per_set;

        let (side, duration_ms) = match kind {
            TimeoutKind::Team => {
                let side = side.ok_or(RejectionReason::MissingSide)?;
                let used = current_record(state)?.timeouts_used.get_mut(side);
                if *used >= allowed {
                    return Err(RejectionReason::TimeoutsExhausted { side, allowed });
                }
                *used += 1;
                (Some(side), self.config.format.timeout_duration_ms)
            }
            TimeoutKind::Technical => {
                let rule = self
                    .config
                    .technical_timeout_for(set_number)
                    .ok_or(RejectionReason::TechnicalTimeoutUnavailable { set: set_number })?;
                let record = current_record(state)?;
                if record.technical_timeout_used {
                    return Err(RejectionReason::TechnicalTimeoutUsed { set: set_number });
                }
                record.technical_timeout_used = true;
                state.technical_timeout_due = false;
                (None, rule.duration_ms)
            }
        };

        let seq = state.events.len() as u64;
        let started_at = clamp_time(state, at);
        let timer = ActiveTimer {
            id: stable_id(state.match_id, "timer", seq),
            kind,
            side,
            set_number,
            started_at,
            ends_at: started_at.saturating_add(duration_ms),
            duration_ms,
        };
        let kind_event = EventKind::TimeoutStarted {
            timer_id: timer.id,
            side,
            kind,
            ends_at: timer.ends_at,
        };
        state.active_timer = Some(timer);
        push_event(state, at, kind_event);
        Ok(())
    }

    fn configure_set(
        &self,
        state: &mut MatchState,
        set_number: u8,
        coin_toss: CoinToss,
        choices: SetChoices,
        at: EpochMillis,
    ) -> Result<(), RejectionReason> {
        if state.is_game_ended {
            return Err(RejectionReason::MatchEnded);
        }
        if set_number != state.current_set {
            return Err(RejectionReason::WrongSet {
                expected: state.current_set,
                got: set_number,
            });
        }
        if current_record(state)?.configuration.is_configured {
            return Err(RejectionReason::AlreadyConfigured { set: set_number });
        }
        check_toss(coin_toss, &choices)?;
        self.check_serve_orders(&choices)?;

        install_choices(state, Some(coin_toss), &choices);
        push_event(
            state,
            at,
            EventKind::SetConfigured {
                coin_toss: Some(coin_toss),
                choices,
                automatic: false,
            },
        );
        Ok(())
    }

    fn check_serve_orders(&self, choices: &SetChoices) -> Result<(), RejectionReason> {
        for side in Side::BOTH {
            let order = choices.serve_orders.get(side);
            let roster_len = self.config.roster_len(side);
            if order.len() != roster_len {
                return Err(RejectionReason::InvalidServeOrder {
                    side,
                    reason: format!("expected {roster_len} entries, got {}", order.len()),
                });
            }
            let mut seen = vec![false; roster_len];
            for &player in order {
                match seen.get_mut(player) {
                    Some(slot) if !*slot => *slot = true,
                    Some(_) => {
                        return Err(RejectionReason::InvalidServeOrder {
                            side,
                            reason: format!("player {player} listed twice"),
                        });
                    }
                    None => {
                        return Err(RejectionReason::InvalidServeOrder {
                            side,
                            reason: format!("player {player} is not on the roster"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// An overridden score stays in range and never decides an open set on its own.
    fn check_override_score(&self, state: &MatchState, score: PerSide<u32>) -> Result<(), RejectionReason> {
        if score.team_a > MAX_SET_SCORE || score.team_b > MAX_SET_SCORE {
            return Err(RejectionReason::StructuralViolation(format!(
                "set score cannot exceed {MAX_SET_SCORE}"
            )));
        }
        let open = state.current().is_some_and(|set| set.winner.is_none());
        if open && self.set_winner(state.current_set, score).is_some() {
            return Err(RejectionReason::StructuralViolation(format!(
                "score {}-{} would already decide set {}",
                score.team_a, score.team_b, state.current_set
            )));
        }
        Ok(())
    }

    fn override_state(
        &self,
        state: &mut MatchState,
        patch: StatePatch,
        reason: Option<String>,
        at: EpochMillis,
    ) -> Result<(), RejectionReason> {
        if patch.is_empty() {
            return Err(RejectionReason::EmptyOverride);
        }

        if let Some(target) = patch.current_set {
            if target < state.current_set {
                return Err(RejectionReason::StructuralViolation(format!(
                    "set number cannot move back from {} to {target}",
                    state.current_set
                )));
            }
            if target > self.config.set_count() {
                return Err(RejectionReason::StructuralViolation(format!(
                    "set {target} exceeds the {} set format",
                    self.config.set_count()
                )));
            }
            while state.current_set < target {
                let next = state.current_set + 1;
                state.sets.push(SetRecord::open(next));
                state.current_set = next;
            }
        }

        if let Some(choices) = &patch.set_configuration {
            self.check_serve_orders(choices)?;
            let coin_toss = current_record(state)?.configuration.coin_toss;
            install_choices(state, coin_toss, choices);
        }

        if let Some(sets_won) = patch.sets_won {
            let cap = self.config.sets_to_win();
            if sets_won.team_a > cap || sets_won.team_b > cap {
                return Err(RejectionReason::StructuralViolation(format!(
                    "sets won cannot exceed {cap}"
                )));
            }
            state.sets_won = sets_won;
        }

        if let Some(score) = patch.score {
            self.check_override_score(state, score)?;
        }

        let record = current_record(state)?;
        if let Some(score) = patch.score {
            record.score = score;
        }
        if let Some(timeouts) = patch.timeouts_used {
            record.timeouts_used = timeouts;
        }
        if let Some(left_is_team_a) = patch.left_is_team_a {
            state.left_is_team_a = left_is_team_a;
        }

        if patch.serving_side.is_some() || patch.serving_player.is_some() {
            let side = patch.serving_side.unwrap_or(state.serving_side);
            let player = patch.serving_player.unwrap_or(state.serving_player);
            let order = state.serve_order.get(side);
            let Some(position) = order.iter().position(|candidate| *candidate == player) else {
                return Err(RejectionReason::StructuralViolation(format!(
                    "player {player} is not in the serve order of {side:?}"
                )));
            };
            let len = order.len();
            state.serving_side = side;
            state.serving_player = player;
            *state.next_server_index.get_mut(side) = (position + 1) % len;
        }

        if let Some(ended) = patch.is_game_ended {
            state.is_game_ended = ended;
            state.winner = if ended { patch.winner.or(state.winner) } else { None };
            if ended {
                state.active_timer = None;
            }
        }

        push_event(state, at, EventKind::Override { patch, reason });
        Ok(())
    }
}

fn end_timeout(state: &mut MatchState, at: EpochMillis) -> Result<(), RejectionReason> {
    let timer = state
        .active_timer
        .take()
        .ok_or(RejectionReason::NoActiveTimer)?;
    let at = clamp_time(state, at);
    push_event(
        state,
        at,
        EventKind::TimeoutEnded {
            timer_id: timer.id,
            early: at < timer.ends_at,
        },
    );
    Ok(())
}

fn current_record(state: &mut MatchState) -> Result<&mut SetRecord, RejectionReason> {
    let set = state.current_set;
    state
        .current_mut()
        .ok_or_else(|| RejectionReason::StructuralViolation(format!("set {set} is not open")))
}

fn check_toss(coin_toss: CoinToss, choices: &SetChoices) -> Result<(), RejectionReason> {
    let expected = match coin_toss.choice {
        TossChoice::Serve => Some(coin_toss.winner),
        TossChoice::Receive => Some(coin_toss.winner.opponent()),
        TossChoice::CourtSide => None,
    };
    match expected {
        Some(server) if server != choices.first_server => Err(
            RejectionReason::InconsistentChoices(format!(
                "{:?} chose {:?} but {:?} is set to serve first",
                coin_toss.winner, coin_toss.choice, choices.first_server
            )),
        ),
        _ => Ok(()),
    }
}

/// Install opening choices on the set in play and hand the serve to the first server.
fn install_choices(state: &mut MatchState, coin_toss: Option<CoinToss>, choices: &SetChoices) {
    state.serve_order = choices.serve_orders.clone();
    state.next_server_index = PerSide::default();
    state.left_is_team_a = choices.left_side == Side::TeamA;
    let player = advance_server(state, choices.first_server);
    state.serving_side = choices.first_server;
    state.serving_player = player;
    if let Some(record) = state.current_mut() {
        record.configuration.is_configured = true;
        record.configuration.coin_toss = coin_toss;
        record.configuration.choices = Some(choices.clone());
    }
}

/// Return the next player of `side` in rotation and move the rotation forward.
fn advance_server(state: &mut MatchState, side: Side) -> usize {
    let order = state.serve_order.get(side);
    if order.is_empty() {
        return 0;
    }
    let index = *state.next_server_index.get(side) % order.len();
    let player = order[index];
    *state.next_server_index.get_mut(side) = (index + 1) % order.len();
    player
}

fn clamp_time(state: &MatchState, at: EpochMillis) -> EpochMillis {
    state.last_event_at().map_or(at, |last| at.max(last))
}

fn push_event(state: &mut MatchState, at: EpochMillis, kind: EventKind) {
    let seq = state.events.len() as u64;
    let at = clamp_time(state, at);
    let event = MatchEvent {
        id: stable_id(state.match_id, "event", seq),
        seq,
        set_number: state.current_set,
        at,
        kind,
    };
    state.events.push(event);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;
    use crate::state::match_state::{MatchFormat, TeamRoster};

    fn config_with(format: MatchFormat) -> MatchConfiguration {
        MatchConfiguration {
            match_id: Uuid::new_v4(),
            teams: PerSide::new(
                TeamRoster {
                    id: Uuid::new_v4(),
                    name: "Dune".into(),
                    players: vec!["Ana".into(), "Bea".into()],
                },
                TeamRoster {
                    id: Uuid::new_v4(),
                    name: "Reef".into(),
                    players: vec!["Cleo".into(), "Dani".into()],
                },
            ),
            format,
        }
    }

    fn config() -> MatchConfiguration {
        config_with(MatchFormat::default())
    }

    fn choices(first_server: Side) -> SetChoices {
        SetChoices {
            first_server,
            left_side: Side::TeamA,
            serve_orders: PerSide::new(vec![0, 1], vec![1, 0]),
        }
    }

    fn started(config: &MatchConfiguration) -> MatchState {
        let sm = MatchStateMachine::new(config);
        sm.apply(
            &MatchState::new(config),
            MatchAction::ConfigureSet {
                set_number: 1,
                coin_toss: CoinToss {
                    winner: Side::TeamA,
                    choice: TossChoice::Serve,
                },
                choices: choices(Side::TeamA),
                at: 1_000,
            },
        )
        .unwrap()
    }

    fn point(sm: &MatchStateMachine<'_>, state: &MatchState, side: Side) -> MatchState {
        let at = state.last_event_at().unwrap_or(0) + 10;
        sm.apply(
            state,
            MatchAction::AwardPoint {
                side,
                category: None,
                at,
            },
        )
        .unwrap()
    }

    fn set_score(sm: &MatchStateMachine<'_>, state: &MatchState, a: u32, b: u32) -> MatchState {
        let at = state.last_event_at().unwrap_or(0) + 10;
        sm.apply(
            state,
            MatchAction::OverrideState {
                patch: StatePatch {
                    score: Some(PerSide::new(a, b)),
                    ..StatePatch::default()
                },
                reason: Some("test setup".into()),
                at,
            },
        )
        .unwrap()
    }

    fn win_set(sm: &MatchStateMachine<'_>, mut state: MatchState, side: Side) -> MatchState {
        let set = state.current_set;
        while state.current_set == set && !state.is_game_ended {
            state = point(sm, &state, side);
            if state.technical_timeout_due {
                state = sm
                    .apply(
                        &state,
                        MatchAction::StartTimeout {
                            side: None,
                            kind: TimeoutKind::Technical,
                            at: 0,
                        },
                    )
                    .unwrap();
                state = sm.apply(&state, MatchAction::EndTimeout { at: 0 }).unwrap();
            }
        }
        state
    }

    fn count(state: &MatchState, tag: &str) -> usize {
        state
            .events
            .iter()
            .filter(|event| event.kind.tag() == tag)
            .count()
    }

    #[test]
    fn configure_set_hands_serve_to_first_server() {
        let config = config();
        let state = started(&config);
        assert!(state.is_set_configured());
        assert_eq!(state.serving_side, Side::TeamA);
        assert_eq!(state.serving_player, 0);
        assert_eq!(state.next_server_index.team_a, 1);
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn points_are_rejected_before_the_toss() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let err = sm
            .apply(
                &MatchState::new(&config),
                MatchAction::AwardPoint {
                    side: Side::TeamA,
                    category: None,
                    at: 0,
                },
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::SetNotConfigured { set: 1 });
    }

    #[test]
    fn configure_twice_is_rejected() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);
        let err = sm
            .apply(
                &state,
                MatchAction::ConfigureSet {
                    set_number: 1,
                    coin_toss: CoinToss {
                        winner: Side::TeamB,
                        choice: TossChoice::CourtSide,
                    },
                    choices: choices(Side::TeamA),
                    at: 2_000,
                },
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::AlreadyConfigured { set: 1 });
    }

    #[test]
    fn choices_must_match_the_toss() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let err = sm
            .apply(
                &MatchState::new(&config),
                MatchAction::ConfigureSet {
                    set_number: 1,
                    coin_toss: CoinToss {
                        winner: Side::TeamB,
                        choice: TossChoice::Serve,
                    },
                    choices: choices(Side::TeamA),
                    at: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RejectionReason::InconsistentChoices(_)));
    }

    #[test]
    fn serve_order_must_cover_the_roster() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let mut bad = choices(Side::TeamA);
        bad.serve_orders.team_b = vec![1, 1];
        let err = sm
            .apply(
                &MatchState::new(&config),
                MatchAction::ConfigureSet {
                    set_number: 1,
                    coin_toss: CoinToss {
                        winner: Side::TeamA,
                        choice: TossChoice::Serve,
                    },
                    choices: bad,
                    at: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RejectionReason::InvalidServeOrder { side: Side::TeamB, .. }
        ));
    }

    #[test]
    fn side_out_rotates_the_receiving_team() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);

        let state = point(&sm, &state, Side::TeamA);
        assert_eq!((state.serving_side, state.serving_player), (Side::TeamA, 0));

        let state = point(&sm, &state, Side::TeamB);
        assert_eq!((state.serving_side, state.serving_player), (Side::TeamB, 1));
        assert_eq!(state.possession, Some(Side::TeamB));

        let state = point(&sm, &state, Side::TeamA);
        assert_eq!((state.serving_side, state.serving_player), (Side::TeamA, 1));

        let state = point(&sm, &state, Side::TeamB);
        assert_eq!((state.serving_side, state.serving_player), (Side::TeamB, 0));

        let order = state.serve_order.get(state.serving_side);
        let index = *state.next_server_index.get(state.serving_side);
        assert_eq!(order[(index + order.len() - 1) % order.len()], state.serving_player);
    }

    #[test]
    fn side_switch_fires_entering_threshold_sum() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let mut state = started(&config);
        for _ in 0..6 {
            state = point(&sm, &state, Side::TeamA);
        }
        assert_eq!(state.current_score().sum(), 6);
        assert!(state.left_is_team_a);
        assert_eq!(count(&state, "side_switch"), 0);

        state = point(&sm, &state, Side::TeamB);
        assert_eq!(state.current_score().sum(), 7);
        assert!(!state.left_is_team_a);
        assert_eq!(count(&state, "side_switch"), 1);
        assert_eq!(state.current().unwrap().side_switches, 1);

        state = point(&sm, &state, Side::TeamB);
        assert!(!state.left_is_team_a);
        assert_eq!(count(&state, "side_switch"), 1);
    }

    #[test]
    fn side_switch_fires_once_per_threshold_after_override() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let mut state = started(&config);
        state = set_score(&sm, &state, 4, 2);
        state = point(&sm, &state, Side::TeamA);
        assert_eq!(count(&state, "side_switch"), 1);

        state = set_score(&sm, &state, 4, 2);
        state = point(&sm, &state, Side::TeamA);
        assert_eq!(count(&state, "side_switch"), 1);
    }

    #[test]
    fn two_point_margin_governs_set_end() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);

        let at_20_19 = set_score(&sm, &state, 19, 19);
        let at_20_19 = point(&sm, &at_20_19, Side::TeamA);
        assert_eq!(at_20_19.current_set, 1);
        assert_eq!(at_20_19.current_score(), PerSide::new(20, 19));

        let at_21_19 = point(&sm, &set_score(&sm, &state, 20, 19), Side::TeamA);
        assert_eq!(at_21_19.sets_won, PerSide::new(1, 0));
        assert_eq!(at_21_19.current_set, 2);

        let at_21_20 = point(&sm, &set_score(&sm, &state, 20, 20), Side::TeamA);
        assert_eq!(at_21_20.current_set, 1);
        let at_22_20 = point(&sm, &at_21_20, Side::TeamA);
        assert_eq!(at_22_20.sets_won, PerSide::new(1, 0));

        let at_23_24 = point(&sm, &set_score(&sm, &state, 23, 23), Side::TeamB);
        assert_eq!(at_23_24.current_set, 1);
        let at_23_25 = point(&sm, &at_23_24, Side::TeamB);
        assert_eq!(at_23_25.sets_won, PerSide::new(0, 1));
        assert_eq!(at_23_25.sets[0].winner, Some(Side::TeamB));
        assert_eq!(at_23_25.sets[0].score, PerSide::new(23, 25));
    }

    #[test]
    fn straight_sets_end_the_match() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        assert_eq!(state.current_set, 2);
        assert!(state.is_set_configured());
        assert_eq!(state.serving_side, Side::TeamB);

        let state = win_set(&sm, state, Side::TeamA);
        assert!(state.is_game_ended);
        assert_eq!(state.winner, Some(Side::TeamA));
        assert_eq!(state.sets.len(), 2);
        assert_eq!(count(&state, "match_ended"), 1);

        let err = sm
            .apply(
                &state,
                MatchAction::AwardPoint {
                    side: Side::TeamB,
                    category: None,
                    at: 0,
                },
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::MatchEnded);
    }

    #[test]
    fn split_sets_open_an_unconfigured_decider() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        let state = win_set(&sm, state, Side::TeamB);
        assert_eq!(state.current_set, 3);
        assert_eq!(state.sets_won, PerSide::new(1, 1));
        assert!(!state.is_set_configured());
        assert!(!state.is_game_ended);
    }

    #[test]
    fn toss_every_set_leaves_set_two_unconfigured() {
        let config = config_with(MatchFormat {
            coin_toss_mode: CoinTossMode::TossEverySet,
            ..MatchFormat::default()
        });
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        assert_eq!(state.current_set, 2);
        assert!(!state.is_set_configured());
    }

    #[test]
    fn technical_timeout_is_flagged_at_trigger_sum() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = set_score(&sm, &started(&config), 10, 10);
        assert!(!state.technical_timeout_due);
        let state = point(&sm, &state, Side::TeamA);
        assert!(state.technical_timeout_due);

        let state = sm
            .apply(
                &state,
                MatchAction::StartTimeout {
                    side: None,
                    kind: TimeoutKind::Technical,
                    at: 50_000,
                },
            )
            .unwrap();
        assert!(!state.technical_timeout_due);
        let timer = state.active_timer.clone().unwrap();
        assert_eq!(timer.ends_at, timer.started_at + 30_000);

        let state = sm
            .apply(&state, MatchAction::EndTimeout { at: 60_000 })
            .unwrap();
        let err = sm
            .apply(
                &state,
                MatchAction::StartTimeout {
                    side: None,
                    kind: TimeoutKind::Technical,
                    at: 61_000,
                },
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::TechnicalTimeoutUsed { set: 1 });
    }

    #[test]
    fn team_timeouts_respect_allotment_and_single_timer() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);
        let running = sm
            .apply(
                &state,
                MatchAction::StartTimeout {
                    side: Some(Side::TeamB),
                    kind: TimeoutKind::Team,
                    at: 2_000,
                },
            )
            .unwrap();
        assert_eq!(
            sm.apply(
                &running,
                MatchAction::StartTimeout {
                    side: Some(Side::TeamA),
                    kind: TimeoutKind::Team,
                    at: 2_500,
                },
            )
            .unwrap_err(),
            RejectionReason::TimerActive
        );
        assert_eq!(
            sm.apply(
                &running,
                MatchAction::AwardPoint {
                    side: Side::TeamA,
                    category: None,
                    at: 2_500,
                },
            )
            .unwrap_err(),
            RejectionReason::TimerActive
        );

        let ended = sm
            .apply(&running, MatchAction::EndTimeout { at: 3_000 })
            .unwrap();
        assert!(ended.active_timer.is_none());
        assert!(matches!(
            ended.events.last().unwrap().kind,
            EventKind::TimeoutEnded { early: true, .. }
        ));
        assert_eq!(
            sm.apply(
                &ended,
                MatchAction::StartTimeout {
                    side: Some(Side::TeamB),
                    kind: TimeoutKind::Team,
                    at: 4_000,
                },
            )
            .unwrap_err(),
            RejectionReason::TimeoutsExhausted {
                side: Side::TeamB,
                allowed: 1
            }
        );
        assert_eq!(
            sm.apply(&ended, MatchAction::EndTimeout { at: 4_000 })
                .unwrap_err(),
            RejectionReason::NoActiveTimer
        );
    }

    #[test]
    fn override_keeps_set_numbers_monotonic() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        let err = sm
            .apply(
                &state,
                MatchAction::OverrideState {
                    patch: StatePatch {
                        current_set: Some(1),
                        ..StatePatch::default()
                    },
                    reason: None,
                    at: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RejectionReason::StructuralViolation(_)));

        let err = sm
            .apply(
                &state,
                MatchAction::OverrideState {
                    patch: StatePatch::default(),
                    reason: None,
                    at: 0,
                },
            )
            .unwrap_err();
        assert_eq!(err, RejectionReason::EmptyOverride);
    }

    #[test]
    fn override_can_correct_a_finished_match() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        let state = win_set(&sm, state, Side::TeamA);
        let corrected = sm
            .apply(
                &state,
                MatchAction::OverrideState {
                    patch: StatePatch {
                        serving_side: Some(Side::TeamB),
                        serving_player: Some(0),
                        ..StatePatch::default()
                    },
                    reason: Some("scoresheet fix".into()),
                    at: 0,
                },
            )
            .unwrap();
        assert!(corrected.is_game_ended);
        assert_eq!(corrected.serving_side, Side::TeamB);
        assert_eq!(corrected.next_server_index.team_b, 0);
        assert_eq!(count(&corrected, "override"), 1);
    }

    #[test]
    fn event_log_is_time_ordered() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);
        let state = sm
            .apply(
                &state,
                MatchAction::AwardPoint {
                    side: Side::TeamA,
                    category: Some(PointCategory::Attack),
                    at: 10,
                },
            )
            .unwrap();
        assert!(state.events.windows(2).all(|pair| pair[0].at <= pair[1].at));
        assert_eq!(state.events.last().unwrap().at, 1_000);
    }

    #[test]
    fn replay_reproduces_a_full_match() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        let state = win_set(&sm, state, Side::TeamB);
        let state = sm
            .apply(
                &state,
                MatchAction::ConfigureSet {
                    set_number: 3,
                    coin_toss: CoinToss {
                        winner: Side::TeamB,
                        choice: TossChoice::Receive,
                    },
                    choices: choices(Side::TeamA),
                    at: 900_000,
                },
            )
            .unwrap();
        let state = win_set(&sm, state, Side::TeamB);
        assert!(state.is_game_ended);

        assert_eq!(sm.replay(&state.events).unwrap(), state);
    }

    #[test]
    fn alternate_mode_configures_the_decider_automatically() {
        let config = config_with(MatchFormat {
            coin_toss_mode: CoinTossMode::Alternate,
            ..MatchFormat::default()
        });
        let sm = MatchStateMachine::new(&config);
        let state = win_set(&sm, started(&config), Side::TeamA);
        let set_two = state.sets[1].configuration.choices.clone().unwrap();
        assert_eq!(set_two.first_server, Side::TeamB);
        assert_eq!(set_two.left_side, Side::TeamB);

        let state = win_set(&sm, state, Side::TeamB);
        assert_eq!(state.current_set, 3);
        assert_eq!(state.sets_won, PerSide::new(1, 1));
        assert!(state.is_set_configured());

        let decider = state.sets[2].configuration.choices.clone().unwrap();
        assert_eq!(decider.first_server, set_two.first_server.opponent());
        assert_eq!(decider.left_side, set_two.left_side.opponent());
        assert_eq!(decider.serve_orders, set_two.serve_orders);
        assert_eq!(state.serving_side, Side::TeamA);
        assert_eq!(state.serving_player, 0);
        assert!(state.left_is_team_a);

        let last = state.events.last().unwrap();
        assert_eq!(last.set_number, 3);
        assert!(matches!(
            last.kind,
            EventKind::SetConfigured {
                coin_toss: None,
                automatic: true,
                ..
            }
        ));

        let state = point(&sm, &state, Side::TeamA);
        assert_eq!(sm.replay(&state.events).unwrap(), state);
    }

    #[test]
    fn override_scores_are_bounded_and_never_decide_a_set() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = started(&config);
        let override_score = |team_a, team_b| {
            sm.apply(
                &state,
                MatchAction::OverrideState {
                    patch: StatePatch {
                        score: Some(PerSide::new(team_a, team_b)),
                        ..StatePatch::default()
                    },
                    reason: None,
                    at: 2_000,
                },
            )
        };

        assert!(matches!(
            override_score(u32::MAX, u32::MAX),
            Err(RejectionReason::StructuralViolation(_))
        ));
        assert!(matches!(
            override_score(21, 10),
            Err(RejectionReason::StructuralViolation(_))
        ));
        assert!(matches!(
            override_score(MAX_SET_SCORE, MAX_SET_SCORE),
            Ok(_)
        ));

        let deuce = override_score(MAX_SET_SCORE, MAX_SET_SCORE).unwrap();
        let next = point(&sm, &deuce, Side::TeamA);
        assert_eq!(next.current_score(), PerSide::new(MAX_SET_SCORE + 1, MAX_SET_SCORE));
    }

    #[test]
    fn far_future_timestamps_saturate_timer_deadlines() {
        let config = config();
        let sm = MatchStateMachine::new(&config);
        let state = sm
            .apply(
                &started(&config),
                MatchAction::StartTimeout {
                    side: Some(Side::TeamA),
                    kind: TimeoutKind::Team,
                    at: u64::MAX,
                },
            )
            .unwrap();
        let timer = state.active_timer.as_ref().unwrap();
        assert_eq!(timer.started_at, u64::MAX);
        assert_eq!(timer.ends_at, u64::MAX);

        let state = sm.apply(&state, MatchAction::EndTimeout { at: 0 }).unwrap();
        assert!(state.active_timer.is_none());
        assert_eq!(state.last_event_at(), Some(u64::MAX));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Point(Side),
        Timeout(Side),
        Technical,
        End,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            8 => any::<bool>().prop_map(|a| Step::Point(if a { Side::TeamA } else { Side::TeamB })),
            1 => any::<bool>().prop_map(|a| Step::Timeout(if a { Side::TeamA } else { Side::TeamB })),
            1 => Just(Step::Technical),
            2 => Just(Step::End),
        ]
    }

    proptest! {
        #[test]
        fn replay_matches_incremental_state(steps in proptest::collection::vec(step(), 0..200)) {
            let config = config();
            let sm = MatchStateMachine::new(&config);
            let mut state = started(&config);
            for (index, step) in steps.into_iter().enumerate() {
                let at = 1_000 + index as u64 * 250;
                let action = match step {
                    Step::Point(side) => MatchAction::AwardPoint { side, category: None, at },
                    Step::Timeout(side) => MatchAction::StartTimeout { side: Some(side), kind: TimeoutKind::Team, at },
                    Step::Technical => MatchAction::StartTimeout { side: None, kind: TimeoutKind::Technical, at },
                    Step::End => MatchAction::EndTimeout { at },
                };
                if let Ok(next) = sm.apply(&state, action) {
                    state = next;
                }
            }
            prop_assert_eq!(sm.replay(&state.events).unwrap(), state);
        }
    }
}
