use mongodb::error::{Error as MongoError, ErrorKind, RETRYABLE_WRITE_ERROR};
use thiserror::Error;

use crate::dao::gateway::{GatewayError, GatewayErrorKind};

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to upsert `{id}` into `{collection}`")]
    Upsert {
        collection: &'static str,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load `{id}` from `{collection}`")]
    Load {
        collection: &'static str,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("timer `{id}` does not exist")]
    MissingTimer { id: String },
}

fn kind_of(err: &MongoError) -> GatewayErrorKind {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => GatewayErrorKind::Network,
        ErrorKind::Write(_) | ErrorKind::InvalidArgument { .. } => GatewayErrorKind::Rejected,
        _ if err.contains_label(RETRYABLE_WRITE_ERROR) => GatewayErrorKind::Network,
        _ => GatewayErrorKind::Other,
    }
}

impl MongoDaoError {
    fn kind(&self) -> GatewayErrorKind {
        match self {
            MongoDaoError::InitialPing { source, .. }
            | MongoDaoError::HealthPing { source }
            | MongoDaoError::Upsert { source, .. }
            | MongoDaoError::Load { source, .. } => kind_of(source),
            MongoDaoError::MissingTimer { .. } => GatewayErrorKind::Rejected,
            MongoDaoError::MissingEnvVar { .. }
            | MongoDaoError::InvalidUri { .. }
            | MongoDaoError::ClientConstruction { .. } => GatewayErrorKind::Other,
        }
    }
}

impl From<MongoDaoError> for GatewayError {
    fn from(err: MongoDaoError) -> Self {
        let message = err.to_string();
        match err.kind() {
            GatewayErrorKind::Network => GatewayError::network(message, err),
            GatewayErrorKind::Rejected => GatewayError::rejected(message),
            GatewayErrorKind::Other => GatewayError::other(message, err),
        }
    }
}
