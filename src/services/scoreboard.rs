use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord,
        },
        snapshot_store::LocalSnapshotStore,
        storage::StorageError,
    },
    services::offline_queue::{OfflineOperationQueue, RemoteOperation},
    state::{
        match_state::{
            CoinToss, EpochMillis, EventKind, MatchConfiguration, MatchState, SetChoices,
        },
        state_machine::{MatchAction, MatchStateMachine, RejectionReason},
    },
};

/// Failures surfaced by [`ScoreboardController`].
#[derive(Debug, Error)]
pub enum ScoreboardError {
    /// The state machine refused the action.
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
    /// The configuration cannot describe a playable match.
    #[error("invalid match configuration: {0}")]
    InvalidConfiguration(String),
    /// A match with this id already exists on this device.
    #[error("match `{0}` already exists")]
    AlreadyStarted(Uuid),
    /// No snapshot exists for the match.
    #[error("match `{0}` not found")]
    NotFound(Uuid),
    /// Local storage could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Orchestrates one match: the only caller of [`MatchStateMachine`].
///
/// Every accepted action is saved locally before its remote operations are queued. A failed
/// local save is logged and the in-memory state stays authoritative.
///
/// Once a batch of remote operations is durably queued, the snapshot store records how many log
/// entries it covers. [`ScoreboardController::resume`] rebuilds whatever a crash left unqueued
/// past that mark. Operation ids derive from their content, so a rebuilt operation that is still
/// pending is not queued twice.
pub struct ScoreboardController {
    config: MatchConfiguration,
    state: MatchState,
    snapshots: LocalSnapshotStore,
    queue: Arc<OfflineOperationQueue>,
}

impl ScoreboardController {
    /// Start a match whose first set is configured by `coin_toss` and `choices`.
    pub fn start(
        config: MatchConfiguration,
        coin_toss: CoinToss,
        choices: SetChoices,
        at: EpochMillis,
        snapshots: LocalSnapshotStore,
        queue: Arc<OfflineOperationQueue>,
    ) -> Result<Self, ScoreboardError> {
        config
            .check()
            .map_err(ScoreboardError::InvalidConfiguration)?;
        let match_id = config.match_id;
        if snapshots.load_config(match_id)?.is_some() {
            return Err(ScoreboardError::AlreadyStarted(match_id));
        }

        let initial = MatchState::new(&config);
        let configured = MatchStateMachine::new(&config).apply(
            &initial,
            MatchAction::ConfigureSet {
                set_number: 1,
                coin_toss,
                choices,
                at,
            },
        )?;

        if let Err(err) = snapshots.save_config(&config) {
            error!(%match_id, error = %err, "failed to persist match configuration");
        }

        let opening = opening_status(&initial, at);
        let mut controller = Self {
            config,
            state: initial,
            snapshots,
            queue,
        };
        controller.commit(configured, vec![opening]);
        Ok(controller)
    }

    /// Rebuild a controller from the latest local snapshot.
    pub fn resume(
        match_id: Uuid,
        snapshots: LocalSnapshotStore,
        queue: Arc<OfflineOperationQueue>,
    ) -> Result<Self, ScoreboardError> {
        let snapshot = snapshots
            .load(match_id)?
            .ok_or(ScoreboardError::NotFound(match_id))?;
        debug!(%match_id, events = snapshot.state.events.len(), "resumed match from snapshot");
        let queued_through = match snapshots.load_queued_through(match_id) {
            Ok(queued_through) => queued_through.unwrap_or(0),
            Err(err) => {
                warn!(%match_id, error = %err, "queued-through mark is unreadable; rebuilding every operation");
                0
            }
        };

        let controller = Self {
            config: snapshot.config,
            state: snapshot.state,
            snapshots,
            queue,
        };
        controller.requeue_unsynced(queued_through);
        Ok(controller)
    }

    pub fn match_id(&self) -> Uuid {
        self.config.match_id
    }

    pub fn config(&self) -> &MatchConfiguration {
        &self.config
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Apply `action`, persist the result and queue its remote operations.
    pub fn dispatch(&mut self, action: MatchAction) -> Result<&MatchState, ScoreboardError> {
        let next = MatchStateMachine::new(&self.config).apply(&self.state, action)?;
        self.commit(next, Vec::new());
        Ok(&self.state)
    }

    fn commit(&mut self, next: MatchState, mut operations: Vec<RemoteOperation>) {
        let previous = std::mem::replace(&mut self.state, next);
        let match_id = self.config.match_id;

        if let Err(err) = self.snapshots.save_state(&self.state) {
            error!(%match_id, error = %err, "failed to persist match state locally");
        }

        operations.extend(remote_operations(&previous, &self.state));
        self.queue_batch(operations);
    }

    /// Queue the operations for the log entries past `queued_through` that never reached the
    /// queue, recomputing them from a replay of the already queued prefix.
    fn requeue_unsynced(&self, queued_through: u64) {
        let match_id = self.config.match_id;
        let logged = self.state.events.len() as u64;
        if queued_through >= logged {
            return;
        }

        let machine = MatchStateMachine::new(&self.config);
        let prefix = self
            .state
            .events
            .get(..queued_through as usize)
            .unwrap_or_default();
        let previous = match machine.replay(prefix) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(%match_id, error = %err, "cannot replay the queued prefix; rebuilding every operation");
                MatchState::new(&self.config)
            }
        };

        let mut operations = Vec::new();
        if previous.events.is_empty() {
            let at = self.state.events.first().map(|event| event.at).unwrap_or_default();
            operations.push(opening_status(&previous, at));
        }
        operations.extend(remote_operations(&previous, &self.state));
        warn!(
            %match_id,
            missing_events = logged - previous.events.len() as u64,
            "re-queueing remote operations lost before they were persisted"
        );
        self.queue_batch(operations);
    }

    /// Queue `operations` as one batch and advance the queued-through mark once it is durable.
    fn queue_batch(&self, operations: Vec<RemoteOperation>) {
        let match_id = self.config.match_id;
        let revision = self.state.events.len() as u64;
        debug!(%match_id, operations = operations.len(), revision, "queueing remote operations");
        let batch = operations
            .into_iter()
            .map(|operation| {
                let id = operation.content_id().unwrap_or_else(|_| Uuid::new_v4());
                (id, operation)
            })
            .collect();

        if self.queue.enqueue_batch(batch).is_err() {
            // The batch lives in memory only; resume rebuilds it from the snapshot.
            return;
        }
        if let Err(err) = self.snapshots.save_queued_through(match_id, revision) {
            warn!(%match_id, error = %err, "failed to record queued-through mark");
        }
    }
}

/// Status announcing a match that was just started from `initial`.
fn opening_status(initial: &MatchState, at: EpochMillis) -> RemoteOperation {
    RemoteOperation::UpdateMatchStatus(MatchStatusUpdate::from_state(initial, at))
}

/// Remote operations describing the move from `previous` to `next`, in submission order: the
/// new events (each followed by its timer record change), a status update when a set or the
/// match ended, then the full state.
pub fn remote_operations(previous: &MatchState, next: &MatchState) -> Vec<RemoteOperation> {
    let match_id = next.match_id;
    let at = next.last_event_at().unwrap_or_default();
    let new_events = next.events.get(previous.events.len()..).unwrap_or_default();
    let mut operations = Vec::with_capacity(new_events.len() * 2 + 2);
    let mut status_changed = false;
    let mut closed_timer = None;

    for event in new_events {
        operations.push(RemoteOperation::AppendEvent(EventRecord {
            match_id,
            event: event.clone(),
        }));
        match &event.kind {
            EventKind::TimeoutStarted {
                timer_id,
                side,
                kind,
                ends_at,
            } => {
                let record = match &next.active_timer {
                    Some(timer) if timer.id == *timer_id => TimerRecord::started(match_id, timer),
                    _ => TimerRecord {
                        id: *timer_id,
                        match_id,
                        set_number: event.set_number,
                        kind: *kind,
                        side: *side,
                        started_at: event.at,
                        ends_at: *ends_at,
                        duration_ms: ends_at.saturating_sub(event.at),
                        ended_at: None,
                    },
                };
                operations.push(RemoteOperation::StartTimerRecord(record));
            }
            EventKind::TimeoutEnded { timer_id, .. } => {
                closed_timer = Some(*timer_id);
                operations.push(RemoteOperation::EndTimerRecord(TimerClosure {
                    match_id,
                    timer_id: *timer_id,
                    ended_at: event.at,
                }));
            }
            EventKind::SetEnded { .. } | EventKind::MatchEnded { .. } => status_changed = true,
            EventKind::Override { patch, .. } => {
                status_changed |= patch.is_game_ended.is_some() || patch.sets_won.is_some();
            }
            EventKind::SetConfigured { .. }
            | EventKind::PointScored { .. }
            | EventKind::SideSwitch { .. } => {}
        }
    }

    // A timer cleared without its own end event (an override ending the match) still needs closing.
    if let Some(timer) = &previous.active_timer {
        if next.active_timer.is_none() && closed_timer != Some(timer.id) {
            operations.push(RemoteOperation::EndTimerRecord(TimerClosure {
                match_id,
                timer_id: timer.id,
                ended_at: at,
            }));
        }
    }

    if status_changed {
        operations.push(RemoteOperation::UpdateMatchStatus(
            MatchStatusUpdate::from_state(next, at),
        ));
    }
    operations.push(RemoteOperation::SaveFullState(MatchStateRecord {
        match_id,
        saved_at: at,
        state: next.clone(),
    }));
    operations
}
