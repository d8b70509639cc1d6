//! Durable, ordered buffer of remote mutations that drains once the remote store is reachable.

mod operation;

pub use operation::{OperationType, QueuedOperation, RemoteOperation};

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, Notify, RwLock, watch};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::{
        gateway::RemoteSyncGateway,
        local_store::{LocalStore, read_json, write_json},
        storage::StorageResult,
    },
    services::connectivity::{ConnectivityOracle, FailureClass},
    state::match_state::{EpochMillis, now_millis},
};

const QUEUE_KEY: &str = "offline-queue";
const DEAD_LETTER_KEY: &str = "offline-queue::dead-letters";
/// Oldest dead letters are discarded beyond this many entries.
const MAX_DEAD_LETTERS: usize = 500;

/// Tuning knobs for the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// Failures without a recognisable cause tolerated before an operation is dropped.
    pub max_unclassified_attempts: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_unclassified_attempts: 5,
        }
    }
}

/// Operation dropped from the queue, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub operation: QueuedOperation,
    pub reason: String,
    pub dropped_at: EpochMillis,
}

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// The queue is empty.
    Completed,
    /// A failure stopped the pass; the head operation is still queued.
    Halted,
    /// Nothing was attempted because the remote store is unreachable.
    Offline,
    /// Another pass was already in progress.
    AlreadyRunning,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    pub submitted: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
}

/// Ordered durable log of pending remote operations.
///
/// Operations are submitted strictly head-to-tail. An operation leaves the queue only after the
/// gateway accepted it or after it was moved to the dead-letter log, so a crash between the
/// remote write and the local removal leads to a re-submission, which the gateway absorbs as an
/// idempotent upsert.
pub struct OfflineOperationQueue {
    store: Arc<dyn LocalStore>,
    oracle: Arc<ConnectivityOracle>,
    gateway: RwLock<Option<Arc<dyn RemoteSyncGateway>>>,
    pending: Mutex<VecDeque<QueuedOperation>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    drain_gate: AsyncMutex<()>,
    wake: Notify,
    pending_count: watch::Sender<usize>,
    options: QueueOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OfflineOperationQueue {
    /// Restore the queue and dead-letter log from `store`, dropping entries that no longer parse.
    pub fn load(
        store: Arc<dyn LocalStore>,
        oracle: Arc<ConnectivityOracle>,
        options: QueueOptions,
    ) -> Self {
        let (pending, filtered) = load_pending(store.as_ref());
        let dead_letters = match read_json::<Vec<DeadLetter>>(store.as_ref(), DEAD_LETTER_KEY) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "dead-letter log is unreadable; starting a fresh one");
                Vec::new()
            }
        };

        if !pending.is_empty() {
            info!(pending = pending.len(), "restored offline queue");
        }
        let (pending_count, _rx) = watch::channel(pending.len());
        let queue = Self {
            store,
            oracle,
            gateway: RwLock::new(None),
            pending: Mutex::new(pending),
            dead_letters: Mutex::new(dead_letters),
            drain_gate: AsyncMutex::new(()),
            wake: Notify::new(),
            pending_count,
            options,
        };
        if filtered {
            let _ = queue.persist(&lock(&queue.pending));
        }
        queue
    }

    /// Install the gateway used by subsequent drains.
    pub async fn install_gateway(&self, gateway: Arc<dyn RemoteSyncGateway>) {
        let mut guard = self.gateway.write().await;
        *guard = Some(gateway);
    }

    /// Remove the gateway; drains report [`DrainOutcome::Offline`] until one is installed again.
    pub async fn clear_gateway(&self) {
        let mut guard = self.gateway.write().await;
        guard.take();
    }

    async fn gateway(&self) -> Option<Arc<dyn RemoteSyncGateway>> {
        let guard = self.gateway.read().await;
        guard.as_ref().cloned()
    }

    /// Append an operation with a fresh id. Never fails: persistence problems are logged and the
    /// in-memory queue stays authoritative.
    pub fn enqueue(&self, operation: RemoteOperation) -> Uuid {
        self.enqueue_with_id(None, operation)
    }

    /// Append an operation, keeping `id` when the caller already assigned one.
    pub fn enqueue_with_id(&self, id: Option<Uuid>, operation: RemoteOperation) -> Uuid {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let _ = self.enqueue_batch(vec![(id, operation)]);
        id
    }

    /// Append operations in order and persist the queue once for the whole batch.
    ///
    /// Operations whose id is already pending are skipped, so rebuilding a batch after a restart
    /// does not duplicate entries. The batch is queued in memory even when the returned error
    /// reports that it did not reach storage.
    pub fn enqueue_batch(&self, operations: Vec<(Uuid, RemoteOperation)>) -> StorageResult<()> {
        let enqueued_at = now_millis();
        let mut added = 0;
        let result = {
            let mut pending = lock(&self.pending);
            for (id, operation) in operations {
                if pending.iter().any(|queued| queued.id == id) {
                    debug!(operation_id = %id, "operation already queued");
                    continue;
                }
                let kind = operation.kind();
                match operation.into_queued(id, enqueued_at) {
                    Ok(queued) => {
                        pending.push_back(queued);
                        added += 1;
                        debug!(operation_id = %id, ?kind, "operation queued");
                    }
                    Err(err) => {
                        error!(operation_id = %id, ?kind, error = %err, "failed to encode operation; dropping it");
                    }
                }
            }
            if added == 0 {
                return Ok(());
            }
            self.pending_count.send_replace(pending.len());
            self.persist(&pending)
        };
        self.wake.notify_one();
        result
    }

    /// Submit pending operations head-to-tail until the queue is empty or a failure stops the pass.
    pub async fn drain(&self) -> DrainReport {
        let Ok(_gate) = self.drain_gate.try_lock() else {
            return self.report(DrainOutcome::AlreadyRunning, 0, 0);
        };
        if !self.oracle.is_online() {
            return self.report(DrainOutcome::Offline, 0, 0);
        }
        let Some(gateway) = self.gateway().await else {
            return self.report(DrainOutcome::Offline, 0, 0);
        };

        let mut submitted = 0;
        let mut dead_lettered = 0;
        let outcome = loop {
            let Some(head) = self.head() else {
                break DrainOutcome::Completed;
            };

            let operation = match RemoteOperation::decode(&head) {
                Ok(operation) => operation,
                Err(err) => {
                    warn!(operation_id = %head.id, error = %err, "queued operation no longer decodes");
                    self.dead_letter(head.id, format!("undecodable payload: {err}"));
                    dead_lettered += 1;
                    continue;
                }
            };

            let Err(err) = operation.submit(gateway.as_ref()).await else {
                self.remove(head.id);
                submitted += 1;
                continue;
            };

            match self.oracle.classify(&err) {
                FailureClass::Connectivity => {
                    warn!(operation_id = %head.id, error = %err, "connectivity lost while draining");
                    self.oracle.set_online(false);
                    break DrainOutcome::Halted;
                }
                FailureClass::Application => {
                    warn!(operation_id = %head.id, kind = ?head.kind, error = %err, "remote store rejected operation");
                    self.dead_letter(head.id, err.to_string());
                    dead_lettered += 1;
                }
                FailureClass::Unclassified => {
                    let attempts = self.record_attempt(head.id);
                    if attempts >= self.options.max_unclassified_attempts {
                        warn!(operation_id = %head.id, attempts, error = %err, "giving up on operation");
                        self.dead_letter(head.id, err.to_string());
                        dead_lettered += 1;
                    } else {
                        warn!(operation_id = %head.id, attempts, error = %err, "operation failed; will retry");
                        break DrainOutcome::Halted;
                    }
                }
            }
        };

        let report = self.report(outcome, submitted, dead_lettered);
        if submitted > 0 || dead_lettered > 0 {
            info!(
                submitted,
                dead_lettered,
                remaining = report.remaining,
                outcome = ?outcome,
                "drain pass finished"
            );
        }
        report
    }

    /// Resolve once an operation has been enqueued since the last call.
    pub async fn enqueued(&self) {
        self.wake.notified().await;
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of pending operations in submission order.
    pub fn pending(&self) -> Vec<QueuedOperation> {
        lock(&self.pending).iter().cloned().collect()
    }

    /// Number of pending operations touching `match_id`.
    pub fn pending_for(&self, match_id: Uuid) -> usize {
        lock(&self.pending)
            .iter()
            .filter(|operation| operation.match_id == Some(match_id))
            .count()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.dead_letters).clone()
    }

    /// Move a dead letter back to the tail of the queue with a fresh attempt count.
    pub fn requeue_dead_letter(&self, id: Uuid) -> bool {
        let Some(mut operation) = self.take_dead_letter(id) else {
            return false;
        };
        operation.attempts = 0;
        {
            let mut pending = lock(&self.pending);
            pending.push_back(operation);
            let _ = self.persist(&pending);
            self.pending_count.send_replace(pending.len());
        }
        info!(operation_id = %id, "dead letter re-queued");
        self.wake.notify_one();
        true
    }

    /// Acknowledge a dead letter and forget it.
    pub fn discard_dead_letter(&self, id: Uuid) -> bool {
        let discarded = self.take_dead_letter(id).is_some();
        if discarded {
            info!(operation_id = %id, "dead letter discarded");
        }
        discarded
    }

    fn take_dead_letter(&self, id: Uuid) -> Option<QueuedOperation> {
        let mut dead_letters = lock(&self.dead_letters);
        let position = dead_letters
            .iter()
            .position(|letter| letter.operation.id == id)?;
        let letter = dead_letters.remove(position);
        self.persist_dead_letters(&dead_letters);
        Some(letter.operation)
    }

    /// Subscribe to changes of the pending count.
    pub fn watch_pending(&self) -> watch::Receiver<usize> {
        self.pending_count.subscribe()
    }

    fn report(&self, outcome: DrainOutcome, submitted: usize, dead_lettered: usize) -> DrainReport {
        DrainReport {
            outcome,
            submitted,
            dead_lettered,
            remaining: self.len(),
        }
    }

    fn head(&self) -> Option<QueuedOperation> {
        lock(&self.pending).front().cloned()
    }

    fn take(&self, id: Uuid) -> Option<QueuedOperation> {
        let mut pending = lock(&self.pending);
        let position = pending.iter().position(|operation| operation.id == id)?;
        let operation = pending.remove(position);
        let _ = self.persist(&pending);
        self.pending_count.send_replace(pending.len());
        operation
    }

    fn remove(&self, id: Uuid) {
        self.take(id);
    }

    fn record_attempt(&self, id: Uuid) -> u32 {
        let mut pending = lock(&self.pending);
        let Some(operation) = pending.iter_mut().find(|operation| operation.id == id) else {
            return 0;
        };
        operation.attempts += 1;
        let attempts = operation.attempts;
        let _ = self.persist(&pending);
        attempts
    }

    fn dead_letter(&self, id: Uuid, reason: String) {
        let Some(operation) = self.take(id) else {
            return;
        };
        let mut dead_letters = lock(&self.dead_letters);
        dead_letters.push(DeadLetter {
            operation,
            reason,
            dropped_at: now_millis(),
        });
        if dead_letters.len() > MAX_DEAD_LETTERS {
            let overflow = dead_letters.len() - MAX_DEAD_LETTERS;
            dead_letters.drain(..overflow);
            warn!(discarded = overflow, "dead-letter log full; discarding the oldest entries");
        }
        self.persist_dead_letters(&dead_letters);
    }

    fn persist_dead_letters(&self, dead_letters: &[DeadLetter]) {
        if let Err(err) = write_json(self.store.as_ref(), DEAD_LETTER_KEY, dead_letters) {
            error!(error = %err, "failed to persist dead-letter log");
        }
    }

    fn persist(&self, pending: &VecDeque<QueuedOperation>) -> StorageResult<()> {
        let result = write_json(self.store.as_ref(), QUEUE_KEY, pending);
        if let Err(err) = &result {
            error!(error = %err, pending = pending.len(), "failed to persist offline queue");
        }
        result
    }
}

/// Read the persisted queue, keeping every entry that still parses. Returns whether anything was
/// filtered out.
fn load_pending(store: &dyn LocalStore) -> (VecDeque<QueuedOperation>, bool) {
    let raw = match read_json::<Vec<Value>>(store, QUEUE_KEY) {
        Ok(raw) => raw.unwrap_or_default(),
        Err(err) => {
            error!(error = %err, "offline queue is unreadable; starting empty");
            return (VecDeque::new(), true);
        }
    };

    let total = raw.len();
    let pending: VecDeque<_> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let parsed = serde_json::from_value::<QueuedOperation>(value).and_then(|operation| {
                RemoteOperation::decode(&operation).map(|_| operation)
            });
            match parsed {
                Ok(operation) => Some(operation),
                Err(err) => {
                    warn!(index, error = %err, "dropping malformed offline queue entry");
                    None
                }
            }
        })
        .collect();
    let filtered = pending.len() != total;
    (pending, filtered)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{
        dao::{
            gateway::memory::{MemoryGateway, ScriptedFailure},
            local_store::MemoryStore,
            models::EventRecord,
            storage::{StorageError, StorageResult},
        },
        state::match_state::{EventKind, MatchEvent, PerSide, Side, stable_id},
    };

    fn event_op(match_id: Uuid, seq: u64) -> RemoteOperation {
        RemoteOperation::AppendEvent(EventRecord {
            match_id,
            event: MatchEvent {
                id: stable_id(match_id, "event", seq),
                seq,
                set_number: 1,
                at: 1_000 + seq,
                kind: EventKind::PointScored {
                    side: Side::TeamA,
                    category: None,
                    score: PerSide::new(seq as u32 + 1, 0),
                },
            },
        })
    }

    async fn online_queue(store: Arc<dyn LocalStore>, options: QueueOptions) -> (OfflineOperationQueue, MemoryGateway) {
        let oracle = Arc::new(ConnectivityOracle::new(true));
        let queue = OfflineOperationQueue::load(store, oracle, options);
        let gateway = MemoryGateway::new();
        queue.install_gateway(Arc::new(gateway.clone())).await;
        (queue, gateway)
    }

    /// Store whose writes can be switched off to simulate a crash before a removal is persisted.
    #[derive(Clone)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Arc<AtomicBool>,
    }

    impl LocalStore for FlakyStore {
        fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable(
                    format!("write to `{key}` refused"),
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }

        fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.keys(prefix)
        }
    }

    #[tokio::test]
    async fn order_is_preserved_across_connectivity_loss() {
        let (queue, gateway) = online_queue(Arc::new(MemoryStore::new()), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        for seq in 0..3 {
            queue.enqueue(event_op(match_id, seq));
        }

        gateway.go_offline_after(1);
        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Halted);
        assert_eq!(report.submitted, 1);
        assert_eq!(report.remaining, 2);
        assert!(!queue.oracle.is_online());

        assert_eq!(queue.drain().await.outcome, DrainOutcome::Offline);

        gateway.set_reachable(true);
        queue.oracle.set_online(true);
        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Completed);
        assert_eq!(report.submitted, 2);

        let keys: Vec<_> = gateway.calls().into_iter().map(|call| call.key).collect();
        let expected: Vec<_> = (0..3).map(|seq| stable_id(match_id, "event", seq)).collect();
        assert_eq!(keys, expected);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn rejected_operation_is_dead_lettered_and_the_rest_flows() {
        let store = MemoryStore::new();
        let (queue, gateway) = online_queue(Arc::new(store.clone()), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        let poisoned = queue.enqueue(event_op(match_id, 0));
        queue.enqueue(event_op(match_id, 1));

        gateway.fail_next(ScriptedFailure::Rejected("invalid document".into()));
        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Completed);
        assert_eq!(report.submitted, 1);
        assert_eq!(report.dead_lettered, 1);

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].operation.id, poisoned);
        assert!(dead[0].reason.contains("invalid document"));

        let reloaded = OfflineOperationQueue::load(
            Arc::new(store),
            Arc::new(ConnectivityOracle::new(true)),
            QueueOptions::default(),
        );
        assert_eq!(reloaded.dead_letters().len(), 1);
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn unclassified_failures_are_retried_up_to_the_limit() {
        let options = QueueOptions {
            max_unclassified_attempts: 2,
        };
        let (queue, gateway) = online_queue(Arc::new(MemoryStore::new()), options).await;
        let match_id = Uuid::new_v4();
        queue.enqueue(event_op(match_id, 0));
        queue.enqueue(event_op(match_id, 1));

        gateway.fail_next(ScriptedFailure::Other("document update conflict".into()));
        gateway.fail_next(ScriptedFailure::Other("document update conflict".into()));

        let first = queue.drain().await;
        assert_eq!(first.outcome, DrainOutcome::Halted);
        assert_eq!(queue.pending()[0].attempts, 1);
        assert!(queue.oracle.is_online());

        let second = queue.drain().await;
        assert_eq!(second.outcome, DrainOutcome::Completed);
        assert_eq!(second.dead_lettered, 1);
        assert_eq!(second.submitted, 1);
    }

    #[tokio::test]
    async fn textual_network_failures_halt_the_drain() {
        let (queue, gateway) = online_queue(Arc::new(MemoryStore::new()), QueueOptions::default()).await;
        queue.enqueue(event_op(Uuid::new_v4(), 0));
        gateway.fail_next(ScriptedFailure::Other("TypeError: Failed to fetch".into()));

        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Halted);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.pending()[0].attempts, 0);
        assert!(!queue.oracle.is_online());
    }

    #[tokio::test]
    async fn interrupted_removal_is_resubmitted_without_duplicates() {
        let inner = MemoryStore::new();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let flaky = FlakyStore {
            inner: inner.clone(),
            fail_writes: fail_writes.clone(),
        };
        let (queue, gateway) = online_queue(Arc::new(flaky), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        queue.enqueue(event_op(match_id, 0));

        fail_writes.store(true, Ordering::SeqCst);
        assert_eq!(queue.drain().await.submitted, 1);

        let restarted = OfflineOperationQueue::load(
            Arc::new(inner),
            Arc::new(ConnectivityOracle::new(true)),
            QueueOptions::default(),
        );
        assert_eq!(restarted.len(), 1);
        restarted.install_gateway(Arc::new(gateway.clone())).await;
        assert_eq!(restarted.drain().await.outcome, DrainOutcome::Completed);

        assert_eq!(gateway.calls().len(), 2);
        assert_eq!(gateway.events(match_id).len(), 1);
    }

    #[tokio::test]
    async fn batches_skip_operations_already_pending() {
        let store = MemoryStore::new();
        let (queue, _gateway) = online_queue(Arc::new(store.clone()), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..3).map(|seq| stable_id(match_id, "operation", seq)).collect();

        queue
            .enqueue_batch(vec![(ids[0], event_op(match_id, 0)), (ids[1], event_op(match_id, 1))])
            .unwrap();
        queue
            .enqueue_batch(vec![
                (ids[0], event_op(match_id, 0)),
                (ids[1], event_op(match_id, 1)),
                (ids[2], event_op(match_id, 2)),
            ])
            .unwrap();

        let pending: Vec<Uuid> = queue.pending().into_iter().map(|operation| operation.id).collect();
        assert_eq!(pending, ids);
        let persisted: Vec<Value> = read_json(&store, QUEUE_KEY).unwrap().unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[tokio::test]
    async fn batch_reports_a_failed_persist_but_stays_queued() {
        let fail_writes = Arc::new(AtomicBool::new(true));
        let flaky = FlakyStore {
            inner: MemoryStore::new(),
            fail_writes,
        };
        let (queue, _gateway) = online_queue(Arc::new(flaky), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        let result = queue.enqueue_batch(vec![
            (Uuid::new_v4(), event_op(match_id, 0)),
            (Uuid::new_v4(), event_op(match_id, 1)),
        ]);
        assert!(result.is_err());
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn dead_letters_can_be_requeued_or_discarded() {
        let store = MemoryStore::new();
        let (queue, gateway) = online_queue(Arc::new(store.clone()), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        let first = queue.enqueue(event_op(match_id, 0));
        let second = queue.enqueue(event_op(match_id, 1));
        gateway.fail_next(ScriptedFailure::Rejected("validation failed".into()));
        gateway.fail_next(ScriptedFailure::Rejected("validation failed".into()));
        assert_eq!(queue.drain().await.dead_lettered, 2);

        assert!(queue.requeue_dead_letter(first));
        assert!(!queue.requeue_dead_letter(first));
        assert!(queue.discard_dead_letter(second));
        assert!(!queue.discard_dead_letter(Uuid::new_v4()));
        assert!(queue.dead_letters().is_empty());
        assert_eq!(queue.pending()[0].attempts, 0);

        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Completed);
        assert_eq!(report.submitted, 1);
        assert_eq!(gateway.events(match_id).len(), 1);

        let persisted: Vec<DeadLetter> = read_json(&store, DEAD_LETTER_KEY).unwrap().unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn dead_letter_log_keeps_the_newest_entries() {
        let (queue, gateway) = online_queue(Arc::new(MemoryStore::new()), QueueOptions::default()).await;
        let match_id = Uuid::new_v4();
        let total = MAX_DEAD_LETTERS as u64 + 5;
        let ids: Vec<Uuid> = (0..total).map(|seq| queue.enqueue(event_op(match_id, seq))).collect();
        for _ in 0..total {
            gateway.fail_next(ScriptedFailure::Rejected("schema mismatch".into()));
        }

        assert_eq!(queue.drain().await.dead_lettered, total as usize);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), MAX_DEAD_LETTERS);
        assert_eq!(dead[0].operation.id, ids[5]);
        assert_eq!(dead.last().unwrap().operation.id, *ids.last().unwrap());
    }

    #[tokio::test]
    async fn malformed_entries_are_filtered_at_load() {
        let store = MemoryStore::new();
        let valid = event_op(Uuid::new_v4(), 0)
            .into_queued(Uuid::new_v4(), 5)
            .unwrap();
        let entries = serde_json::json!([
            { "garbage": true },
            valid,
            { "id": Uuid::new_v4(), "type": "end_timer_record", "payload": {}, "enqueued_at": 1 },
        ]);
        store
            .write(QUEUE_KEY, entries.to_string().as_bytes())
            .unwrap();

        let queue = OfflineOperationQueue::load(
            Arc::new(store.clone()),
            Arc::new(ConnectivityOracle::new(false)),
            QueueOptions::default(),
        );
        assert_eq!(queue.pending(), vec![valid]);

        let persisted: Vec<Value> = read_json(&store, QUEUE_KEY).unwrap().unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn offline_drain_is_a_no_op() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let queue = OfflineOperationQueue::load(
            store,
            Arc::new(ConnectivityOracle::new(false)),
            QueueOptions::default(),
        );
        queue.install_gateway(Arc::new(MemoryGateway::new())).await;
        queue.enqueue(event_op(Uuid::new_v4(), 0));

        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::Offline);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn concurrent_drains_are_single_flight() {
        let (queue, _gateway) = online_queue(Arc::new(MemoryStore::new()), QueueOptions::default()).await;
        queue.enqueue(event_op(Uuid::new_v4(), 0));

        let _held = queue.drain_gate.lock().await;
        let report = queue.drain().await;
        assert_eq!(report.outcome, DrainOutcome::AlreadyRunning);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiters_and_tracks_pending_count() {
        let (queue, _gateway) = online_queue(Arc::new(MemoryStore::new()), QueueOptions::default()).await;
        let mut pending = queue.watch_pending();
        let match_id = Uuid::new_v4();
        queue.enqueue(event_op(match_id, 0));

        tokio::time::timeout(std::time::Duration::from_secs(1), queue.enqueued())
            .await
            .unwrap();
        assert!(pending.has_changed().unwrap());
        assert_eq!(*pending.borrow_and_update(), 1);
        assert_eq!(queue.pending_for(match_id), 1);
        assert_eq!(queue.pending_for(Uuid::new_v4()), 0);
    }
}
