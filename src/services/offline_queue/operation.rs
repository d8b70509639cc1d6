use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::{
        gateway::{GatewayResult, RemoteSyncGateway},
        models::{EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord},
    },
    state::match_state::EpochMillis,
};

/// Kind of remote mutation carried by a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    SaveFullState,
    AppendEvent,
    StartTimerRecord,
    EndTimerRecord,
    UpdateMatchStatus,
}

/// Durable queue entry. The payload stays opaque JSON so an entry written by an older build can
/// still be loaded and inspected even when it no longer decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub payload: Value,
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: EpochMillis,
    #[serde(default)]
    pub match_id: Option<Uuid>,
}

/// Typed view of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOperation {
    SaveFullState(MatchStateRecord),
    AppendEvent(EventRecord),
    StartTimerRecord(TimerRecord),
    EndTimerRecord(TimerClosure),
    UpdateMatchStatus(MatchStatusUpdate),
}

impl RemoteOperation {
    pub fn kind(&self) -> OperationType {
        match self {
            RemoteOperation::SaveFullState(_) => OperationType::SaveFullState,
            RemoteOperation::AppendEvent(_) => OperationType::AppendEvent,
            RemoteOperation::StartTimerRecord(_) => OperationType::StartTimerRecord,
            RemoteOperation::EndTimerRecord(_) => OperationType::EndTimerRecord,
            RemoteOperation::UpdateMatchStatus(_) => OperationType::UpdateMatchStatus,
        }
    }

    pub fn match_id(&self) -> Uuid {
        match self {
            RemoteOperation::SaveFullState(record) => record.match_id,
            RemoteOperation::AppendEvent(record) => record.match_id,
            RemoteOperation::StartTimerRecord(record) => record.match_id,
            RemoteOperation::EndTimerRecord(closure) => closure.match_id,
            RemoteOperation::UpdateMatchStatus(update) => update.match_id,
        }
    }

    fn payload(&self) -> serde_json::Result<Value> {
        match self {
            RemoteOperation::SaveFullState(record) => serde_json::to_value(record),
            RemoteOperation::AppendEvent(record) => serde_json::to_value(record),
            RemoteOperation::StartTimerRecord(record) => serde_json::to_value(record),
            RemoteOperation::EndTimerRecord(closure) => serde_json::to_value(closure),
            RemoteOperation::UpdateMatchStatus(update) => serde_json::to_value(update),
        }
    }

    /// Id derived from the match, the type and the payload: equal operations share an id.
    pub fn content_id(&self) -> serde_json::Result<Uuid> {
        let name = format!("{:?}:{}", self.kind(), self.payload()?);
        Ok(Uuid::new_v5(&self.match_id(), name.as_bytes()))
    }

    /// Wrap the operation into a durable queue entry.
    pub fn into_queued(self, id: Uuid, enqueued_at: EpochMillis) -> serde_json::Result<QueuedOperation> {
        Ok(QueuedOperation {
            id,
            kind: self.kind(),
            payload: self.payload()?,
            attempts: 0,
            enqueued_at,
            match_id: Some(self.match_id()),
        })
    }

    /// Decode the payload of a queue entry according to its type tag.
    pub fn decode(operation: &QueuedOperation) -> serde_json::Result<Self> {
        fn payload<T: DeserializeOwned>(operation: &QueuedOperation) -> serde_json::Result<T> {
            T::deserialize(&operation.payload)
        }

        Ok(match operation.kind {
            OperationType::SaveFullState => RemoteOperation::SaveFullState(payload(operation)?),
            OperationType::AppendEvent => RemoteOperation::AppendEvent(payload(operation)?),
            OperationType::StartTimerRecord => {
                RemoteOperation::StartTimerRecord(payload(operation)?)
            }
            OperationType::EndTimerRecord => RemoteOperation::EndTimerRecord(payload(operation)?),
            OperationType::UpdateMatchStatus => {
                RemoteOperation::UpdateMatchStatus(payload(operation)?)
            }
        })
    }

    /// Hand the operation to the gateway.
    pub fn submit(self, gateway: &dyn RemoteSyncGateway) -> BoxFuture<'static, GatewayResult<()>> {
        match self {
            RemoteOperation::SaveFullState(record) => gateway.upsert_match_state(record),
            RemoteOperation::AppendEvent(record) => gateway.append_event(record),
            RemoteOperation::StartTimerRecord(record) => gateway.upsert_timer(record),
            RemoteOperation::EndTimerRecord(closure) => gateway.close_timer(closure),
            RemoteOperation::UpdateMatchStatus(update) => gateway.update_match_status(update),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::MatchStatus;
    use crate::state::match_state::PerSide;

    #[test]
    fn entries_use_a_type_tag_and_decode_back() {
        let match_id = Uuid::new_v4();
        let operation = RemoteOperation::UpdateMatchStatus(MatchStatusUpdate {
            match_id,
            status: MatchStatus::InProgress,
            current_set: 1,
            sets_won: PerSide::default(),
            winner: None,
            updated_at: 12,
        });
        let queued = operation.clone().into_queued(Uuid::new_v4(), 12).unwrap();
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["type"], "update_match_status");
        assert_eq!(queued.match_id, Some(match_id));
        assert_eq!(RemoteOperation::decode(&queued).unwrap(), operation);
    }

    #[test]
    fn content_ids_follow_the_payload() {
        let match_id = Uuid::new_v4();
        let update = |current_set| {
            RemoteOperation::UpdateMatchStatus(MatchStatusUpdate {
                match_id,
                status: MatchStatus::InProgress,
                current_set,
                sets_won: PerSide::default(),
                winner: None,
                updated_at: 40,
            })
        };
        assert_eq!(update(2).content_id().unwrap(), update(2).content_id().unwrap());
        assert_ne!(update(2).content_id().unwrap(), update(3).content_id().unwrap());
    }

    #[test]
    fn mismatched_payload_fails_to_decode() {
        let queued = QueuedOperation {
            id: Uuid::new_v4(),
            kind: OperationType::EndTimerRecord,
            payload: serde_json::json!({ "unexpected": true }),
            attempts: 0,
            enqueued_at: 0,
            match_id: None,
        };
        assert!(RemoteOperation::decode(&queued).is_err());
    }
}
