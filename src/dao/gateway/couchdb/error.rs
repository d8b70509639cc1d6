//! Error types shared by the CouchDB gateway implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::gateway::{GatewayError, GatewayErrorKind};

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

fn is_unreachable(source: &reqwest::Error) -> bool {
    source.is_connect() || source.is_timeout() || source.is_request()
}

fn status_is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn status_is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

impl CouchDaoError {
    fn kind(&self) -> GatewayErrorKind {
        match self {
            CouchDaoError::DatabaseQuery { source, .. }
            | CouchDaoError::DatabaseCreate { source, .. }
            | CouchDaoError::RequestSend { source, .. }
                if is_unreachable(source) =>
            {
                GatewayErrorKind::Network
            }
            CouchDaoError::RequestStatus { status, .. }
            | CouchDaoError::DatabaseStatus { status, .. }
                if status_is_transient(*status) =>
            {
                GatewayErrorKind::Network
            }
            CouchDaoError::RequestStatus { status, .. } if status_is_rejection(*status) => {
                GatewayErrorKind::Rejected
            }
            _ => GatewayErrorKind::Other,
        }
    }
}

impl From<CouchDaoError> for GatewayError {
    fn from(err: CouchDaoError) -> Self {
        let message = err.to_string();
        match err.kind() {
            GatewayErrorKind::Network => GatewayError::network(message, err),
            GatewayErrorKind::Rejected => GatewayError::rejected(message),
            GatewayErrorKind::Other => GatewayError::other(message, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_gateway_kinds() {
        let status = |status| CouchDaoError::RequestStatus {
            path: "event::1".into(),
            status,
        };
        assert_eq!(
            GatewayError::from(status(StatusCode::SERVICE_UNAVAILABLE)).kind(),
            GatewayErrorKind::Network
        );
        assert_eq!(
            GatewayError::from(status(StatusCode::BAD_REQUEST)).kind(),
            GatewayErrorKind::Rejected
        );
        assert_eq!(
            GatewayError::from(status(StatusCode::CONFLICT)).kind(),
            GatewayErrorKind::Other
        );
    }
}
