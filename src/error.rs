use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::storage::StorageError, services::scoreboard::ScoreboardError,
    state::state_machine::RejectionReason,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Local storage could not be read.
    #[error("local storage unavailable")]
    Unavailable(#[source] StorageError),
    /// The match rules refused the action.
    #[error("action rejected: {0}")]
    Rejected(#[from] RejectionReason),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ScoreboardError> for ServiceError {
    fn from(err: ScoreboardError) -> Self {
        match err {
            ScoreboardError::Rejected(reason) => ServiceError::Rejected(reason),
            ScoreboardError::InvalidConfiguration(message) => ServiceError::InvalidInput(message),
            ScoreboardError::AlreadyStarted(id) => {
                ServiceError::InvalidState(format!("match `{id}` already exists"))
            }
            ScoreboardError::NotFound(id) => ServiceError::NotFound(format!("match `{id}`")),
            ScoreboardError::Storage(source) => ServiceError::Unavailable(source),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Rejected(reason) => AppError::Conflict(reason.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_conflict() {
        let err: AppError = ServiceError::from(ScoreboardError::Rejected(
            RejectionReason::TimerActive,
        ))
        .into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_configuration_maps_to_bad_request() {
        let err: AppError = ServiceError::from(ScoreboardError::InvalidConfiguration(
            "a match needs between 1 and 255 sets".into(),
        ))
        .into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
