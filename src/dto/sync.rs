use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_epoch_millis,
    services::offline_queue::{DeadLetter, OperationType, QueuedOperation},
};

/// Snapshot of the offline queue, served by `/sync/status` and pushed as `sync.status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatus {
    /// Whether the remote store is currently reachable.
    pub online: bool,
    /// Operations waiting to be submitted.
    pub pending: usize,
    /// Pending operations per type, in queue order of first appearance.
    #[schema(value_type = Object)]
    pub pending_by_type: IndexMap<OperationType, usize>,
    /// Operations dropped into the dead-letter log.
    pub dead_letters: usize,
}

impl SyncStatus {
    pub fn new(online: bool, pending: &[QueuedOperation], dead_letters: usize) -> Self {
        let mut pending_by_type = IndexMap::new();
        for operation in pending {
            *pending_by_type.entry(operation.kind).or_insert(0) += 1;
        }
        Self {
            online,
            pending: pending.len(),
            pending_by_type,
            dead_letters,
        }
    }
}

/// Dropped operation, kept for audit.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeadLetterDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub match_id: Option<Uuid>,
    pub attempts: u32,
    pub reason: String,
    pub enqueued_at: String,
    pub dropped_at: String,
}

impl From<DeadLetter> for DeadLetterDto {
    fn from(value: DeadLetter) -> Self {
        Self {
            id: value.operation.id,
            kind: value.operation.kind,
            match_id: value.operation.match_id,
            attempts: value.operation.attempts,
            reason: value.reason,
            enqueued_at: format_epoch_millis(value.operation.enqueued_at),
            dropped_at: format_epoch_millis(value.dropped_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(kind: OperationType) -> QueuedOperation {
        QueuedOperation {
            id: Uuid::new_v4(),
            kind,
            payload: serde_json::Value::Null,
            attempts: 0,
            enqueued_at: 0,
            match_id: None,
        }
    }

    #[test]
    fn pending_breakdown_keeps_first_appearance_order() {
        let pending = [
            queued(OperationType::SaveFullState),
            queued(OperationType::AppendEvent),
            queued(OperationType::AppendEvent),
        ];
        let status = SyncStatus::new(false, &pending, 1);
        assert_eq!(status.pending, 3);
        assert_eq!(
            serde_json::to_string(&status.pending_by_type).unwrap(),
            r#"{"save_full_state":1,"append_event":2}"#
        );
    }
}
