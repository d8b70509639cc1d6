use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{
        local_store::{LocalStore, read_json, write_json},
        storage::StorageResult,
    },
    state::match_state::{EpochMillis, MatchConfiguration, MatchState, now_millis},
};

const STATE_PREFIX: &str = "match-state::";
const CONFIG_PREFIX: &str = "match-config::";
const QUEUED_PREFIX: &str = "match-queued::";

fn state_key(match_id: Uuid) -> String {
    format!("{STATE_PREFIX}{match_id}")
}

fn config_key(match_id: Uuid) -> String {
    format!("{CONFIG_PREFIX}{match_id}")
}

fn queued_key(match_id: Uuid) -> String {
    format!("{QUEUED_PREFIX}{match_id}")
}

/// Value persisted together with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord<T> {
    pub saved_at: EpochMillis,
    pub value: T,
}

/// Latest persisted view of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSnapshot {
    pub config: MatchConfiguration,
    pub state: MatchState,
    pub saved_at: EpochMillis,
}

/// Per-match namespaced records of configuration and live state.
#[derive(Clone)]
pub struct LocalSnapshotStore {
    store: Arc<dyn LocalStore>,
}

impl LocalSnapshotStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Underlying key-value store, shared with the offline queue.
    pub fn backend(&self) -> Arc<dyn LocalStore> {
        self.store.clone()
    }

    pub fn save_state(&self, state: &MatchState) -> StorageResult<()> {
        let record = StoredRecord {
            saved_at: now_millis(),
            value: state,
        };
        write_json(self.store.as_ref(), &state_key(state.match_id), &record)
    }

    pub fn save_config(&self, config: &MatchConfiguration) -> StorageResult<()> {
        let record = StoredRecord {
            saved_at: now_millis(),
            value: config,
        };
        write_json(self.store.as_ref(), &config_key(config.match_id), &record)
    }

    pub fn load_state(&self, match_id: Uuid) -> StorageResult<Option<StoredRecord<MatchState>>> {
        read_json(self.store.as_ref(), &state_key(match_id))
    }

    pub fn load_config(
        &self,
        match_id: Uuid,
    ) -> StorageResult<Option<StoredRecord<MatchConfiguration>>> {
        read_json(self.store.as_ref(), &config_key(match_id))
    }

    /// Record that the remote operations covering the first `events` log entries are durably queued.
    pub fn save_queued_through(&self, match_id: Uuid, events: u64) -> StorageResult<()> {
        let record = StoredRecord {
            saved_at: now_millis(),
            value: events,
        };
        write_json(self.store.as_ref(), &queued_key(match_id), &record)
    }

    /// Number of log entries whose remote operations are known to be queued; `None` when nothing
    /// was ever recorded for the match.
    pub fn load_queued_through(&self, match_id: Uuid) -> StorageResult<Option<u64>> {
        let record: Option<StoredRecord<u64>> = read_json(self.store.as_ref(), &queued_key(match_id))?;
        Ok(record.map(|record| record.value))
    }

    /// Latest snapshot of a match, or `None` when either record is missing.
    pub fn load(&self, match_id: Uuid) -> StorageResult<Option<MatchSnapshot>> {
        let Some(config) = self.load_config(match_id)? else {
            return Ok(None);
        };
        let Some(state) = self.load_state(match_id)? else {
            warn!(%match_id, "match configuration found without a state record");
            return Ok(None);
        };
        Ok(Some(MatchSnapshot {
            config: config.value,
            state: state.value,
            saved_at: state.saved_at,
        }))
    }

    /// Identifiers of every match with a persisted configuration.
    pub fn list_matches(&self) -> StorageResult<Vec<Uuid>> {
        let keys = self.store.keys(CONFIG_PREFIX)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let raw = key.strip_prefix(CONFIG_PREFIX)?;
                match Uuid::parse_str(raw) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(key = %key, error = %err, "ignoring malformed match key");
                        None
                    }
                }
            })
            .collect())
    }
}
