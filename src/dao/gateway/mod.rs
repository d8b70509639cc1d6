#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::{
    EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord,
};

/// Result alias for remote store calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// The only component allowed to talk to the remote store. Every call is an idempotent upsert
/// keyed by a stable id, so the offline queue may retry freely.
pub trait RemoteSyncGateway: Send + Sync {
    fn upsert_match_state(&self, record: MatchStateRecord) -> BoxFuture<'static, GatewayResult<()>>;
    fn append_event(&self, record: EventRecord) -> BoxFuture<'static, GatewayResult<()>>;
    fn upsert_timer(&self, record: TimerRecord) -> BoxFuture<'static, GatewayResult<()>>;
    fn close_timer(&self, closure: TimerClosure) -> BoxFuture<'static, GatewayResult<()>>;
    fn update_match_status(&self, update: MatchStatusUpdate) -> BoxFuture<'static, GatewayResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, GatewayResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, GatewayResult<()>>;
}

/// Coarse failure category reported by a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The remote store could not be reached.
    Network,
    /// The remote store refused the payload; retrying will not help.
    Rejected,
    /// Anything else.
    Other,
}

/// Failure of a remote call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote store unreachable: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("remote store rejected the request: {message}")]
    Rejected { message: String },
    #[error("remote store call failed: {message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl GatewayError {
    pub fn network(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        GatewayError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        GatewayError::Other {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::Network { .. } => GatewayErrorKind::Network,
            GatewayError::Rejected { .. } => GatewayErrorKind::Rejected,
            GatewayError::Other { .. } => GatewayErrorKind::Other,
        }
    }

    /// Message including every error in the source chain, used for text-based classification.
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
