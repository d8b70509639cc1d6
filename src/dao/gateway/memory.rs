use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use super::{GatewayError, GatewayResult, RemoteSyncGateway};
use crate::dao::models::{
    EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord,
};

/// Failure to return from the next remote call.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// Typed network failure.
    Network(String),
    /// Typed rejection.
    Rejected(String),
    /// Untyped failure carrying only a message.
    Other(String),
}

/// Call accepted by the in-memory remote, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub operation: &'static str,
    pub key: Uuid,
}

#[derive(Default)]
struct MemoryRemote {
    offline: bool,
    offline_after: Option<usize>,
    scripted: VecDeque<ScriptedFailure>,
    states: HashMap<Uuid, MatchStateRecord>,
    events: IndexMap<Uuid, EventRecord>,
    timers: IndexMap<Uuid, TimerRecord>,
    statuses: HashMap<Uuid, MatchStatusUpdate>,
    calls: Vec<RemoteCall>,
}

impl MemoryRemote {
    fn gate(&mut self) -> GatewayResult<()> {
        if let Some(remaining) = self.offline_after.as_mut() {
            if *remaining == 0 {
                self.offline = true;
                self.offline_after = None;
            } else {
                *remaining -= 1;
            }
        }
        if self.offline {
            return Err(GatewayError::network(
                "in-memory remote is offline",
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        match self.scripted.pop_front() {
            None => Ok(()),
            Some(ScriptedFailure::Network(message)) => Err(GatewayError::network(
                message.clone(),
                io::Error::new(io::ErrorKind::TimedOut, message),
            )),
            Some(ScriptedFailure::Rejected(message)) => Err(GatewayError::rejected(message)),
            Some(ScriptedFailure::Other(message)) => Err(GatewayError::Other {
                message,
                source: None,
            }),
        }
    }
}

/// Remote store kept in process memory, with failure injection for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<MemoryRemote>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn remote(&self) -> MutexGuard<'_, MemoryRemote> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following call succeed (`true`) or fail with a network error (`false`).
    pub fn set_reachable(&self, reachable: bool) {
        let mut remote = self.remote();
        remote.offline = !reachable;
        remote.offline_after = None;
    }

    /// Accept `calls` more calls, then behave as unreachable.
    pub fn go_offline_after(&self, calls: usize) {
        self.remote().offline_after = Some(calls);
    }

    /// Queue a failure for an upcoming call.
    pub fn fail_next(&self, failure: ScriptedFailure) {
        self.remote().scripted.push_back(failure);
    }

    /// Every accepted call so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.remote().calls.clone()
    }

    /// Events stored for `match_id`, in first-write order.
    pub fn events(&self, match_id: Uuid) -> Vec<EventRecord> {
        self.remote()
            .events
            .values()
            .filter(|record| record.match_id == match_id)
            .cloned()
            .collect()
    }

    pub fn state(&self, match_id: Uuid) -> Option<MatchStateRecord> {
        self.remote().states.get(&match_id).cloned()
    }

    pub fn timer(&self, timer_id: Uuid) -> Option<TimerRecord> {
        self.remote().timers.get(&timer_id).cloned()
    }

    pub fn status(&self, match_id: Uuid) -> Option<MatchStatusUpdate> {
        self.remote().statuses.get(&match_id).cloned()
    }

    fn submit<F>(
        &self,
        operation: &'static str,
        key: Uuid,
        apply: F,
    ) -> BoxFuture<'static, GatewayResult<()>>
    where
        F: FnOnce(&mut MemoryRemote) -> GatewayResult<()> + Send + 'static,
    {
        let gateway = self.clone();
        Box::pin(async move {
            let mut remote = gateway.remote();
            remote.gate()?;
            apply(&mut remote)?;
            remote.calls.push(RemoteCall { operation, key });
            Ok(())
        })
    }
}

impl RemoteSyncGateway for MemoryGateway {
    fn upsert_match_state(&self, record: MatchStateRecord) -> BoxFuture<'static, GatewayResult<()>> {
        self.submit("upsert_match_state", record.match_id, move |remote| {
            remote.states.insert(record.match_id, record);
            Ok(())
        })
    }

    fn append_event(&self, record: EventRecord) -> BoxFuture<'static, GatewayResult<()>> {
        self.submit("append_event", record.event.id, move |remote| {
            remote.events.entry(record.event.id).or_insert(record);
            Ok(())
        })
    }

    fn upsert_timer(&self, record: TimerRecord) -> BoxFuture<'static, GatewayResult<()>> {
        self.submit("upsert_timer", record.id, move |remote| {
            let ended_at = remote.timers.get(&record.id).and_then(|existing| existing.ended_at);
            let mut record = record;
            record.ended_at = record.ended_at.or(ended_at);
            remote.timers.insert(record.id, record);
            Ok(())
        })
    }

    fn close_timer(&self, closure: TimerClosure) -> BoxFuture<'static, GatewayResult<()>> {
        self.submit("close_timer", closure.timer_id, move |remote| {
            let timer = remote.timers.get_mut(&closure.timer_id).ok_or_else(|| {
                GatewayError::rejected(format!("unknown timer `{}`", closure.timer_id))
            })?;
            timer.ended_at = Some(closure.ended_at);
            Ok(())
        })
    }

    fn update_match_status(&self, update: MatchStatusUpdate) -> BoxFuture<'static, GatewayResult<()>> {
        self.submit("update_match_status", update.match_id, move |remote| {
            remote.statuses.insert(update.match_id, update);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            if gateway.remote().offline {
                Err(GatewayError::network(
                    "in-memory remote is offline",
                    io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
                ))
            } else {
                Ok(())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, GatewayResult<()>> {
        self.health_check()
    }
}
