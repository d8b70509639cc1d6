//! Informational win probabilities derived from the live score.
//!
//! Every rally is treated as a fair coin, so the figures only reflect how far each side is from
//! the target. Nothing here feeds back into [`MatchStateMachine`](super::state_machine::MatchStateMachine).

use std::collections::HashMap;

use crate::state::match_state::{MatchConfiguration, MatchState, PerSide, Side};

const RALLY_WIN: f64 = 0.5;

/// Probability that `side` wins a set currently at `score` with the given target.
pub fn set_win_probability(score: PerSide<u32>, target: u32, two_point_margin: bool, side: Side) -> f64 {
    let own = *score.get(side);
    let other = *score.get(side.opponent());
    let mut memo = HashMap::new();
    set_from(own, other, target, two_point_margin, &mut memo)
}

fn set_from(
    own: u32,
    other: u32,
    target: u32,
    margin: bool,
    memo: &mut HashMap<(u32, u32), f64>,
) -> f64 {
    let needed = if margin { 2 } else { 1 };
    if own >= target && own >= other.saturating_add(needed) {
        return 1.0;
    }
    if other >= target && other >= own.saturating_add(needed) {
        return 0.0;
    }
    if margin && own.saturating_add(1) >= target && other.saturating_add(1) >= target {
        // Past the target the set is a race to a two-point lead from the current difference.
        return match own as i64 - other as i64 {
            0 => 0.5,
            1 => 0.75,
            -1 => 0.25,
            diff if diff > 0 => 1.0,
            _ => 0.0,
        };
    }
    if let Some(cached) = memo.get(&(own, other)) {
        return *cached;
    }
    let value = RALLY_WIN * set_from(own.saturating_add(1), other, target, margin, memo)
        + (1.0 - RALLY_WIN) * set_from(own, other.saturating_add(1), target, margin, memo);
    memo.insert((own, other), value);
    value
}

/// Probability that `side` wins the match from the current state.
pub fn match_win_probability(config: &MatchConfiguration, state: &MatchState, side: Side) -> f64 {
    if state.is_game_ended {
        return if state.winner == Some(side) { 1.0 } else { 0.0 };
    }
    let current = set_win_probability(
        state.current_score(),
        config.target_for(state.current_set),
        config.format.two_point_margin,
        side,
    );
    let need = config.sets_to_win();
    let own = *state.sets_won.get(side);
    let other = *state.sets_won.get(side.opponent());
    current * sets_from(own + 1, other, need) + (1.0 - current) * sets_from(own, other + 1, need)
}

fn sets_from(own: u8, other: u8, need: u8) -> f64 {
    if own >= need {
        return 1.0;
    }
    if other >= need {
        return 0.0;
    }
    RALLY_WIN * sets_from(own + 1, other, need) + (1.0 - RALLY_WIN) * sets_from(own, other + 1, need)
}
