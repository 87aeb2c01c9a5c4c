//! Error types of the botvisor server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use botvisor_core::BotvisorError;
use thiserror::Error;

use crate::payload::ErrorResponse;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a server setup operation.
pub type BotvisorServerResult<T> = Result<T, BotvisorServerError>;

/// The result of a request handler.
pub type ServerResult<T> = Result<T, ServerError>;

/// An error that occurred while setting up or running the server.
#[derive(pretty_error_debug::Debug, Error)]
pub enum BotvisorServerError {
    /// The server configuration is invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The supervisor could not be opened.
    #[error(transparent)]
    BotvisorError(#[from] BotvisorError),

    /// An I/O operation failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// An error returned by a request handler.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ServerError {
    /// The request was malformed.
    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    /// The supervisor rejected or failed the operation.
    #[error(transparent)]
    Botvisor(#[from] BotvisorError),

    /// Something went wrong inside the server.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Problems with the shape of a request.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ValidationError {
    /// The request body or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerError {
    /// The HTTP status and error kind reported for this error.
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation"),
            ServerError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ServerError::Botvisor(e) => (status_for(e), e.kind()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: kind.to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn status_for(error: &BotvisorError) -> StatusCode {
    match error {
        BotvisorError::NotFound(_) => StatusCode::NOT_FOUND,
        BotvisorError::DuplicateName(_)
        | BotvisorError::AlreadyRunning(_)
        | BotvisorError::NotRunning(_)
        | BotvisorError::RegistryLocked { .. } => StatusCode::CONFLICT,
        BotvisorError::InvalidUnitName(_)
        | BotvisorError::MissingCredential(_)
        | BotvisorError::MissingManifest(_) => StatusCode::BAD_REQUEST,
        BotvisorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = [
            (BotvisorError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (BotvisorError::DuplicateName("a".into()), StatusCode::CONFLICT),
            (BotvisorError::AlreadyRunning("a".into()), StatusCode::CONFLICT),
            (BotvisorError::NotRunning("a".into()), StatusCode::CONFLICT),
            (BotvisorError::InvalidUnitName("a b".into()), StatusCode::BAD_REQUEST),
            (BotvisorError::MissingCredential("a".into()), StatusCode::BAD_REQUEST),
            (BotvisorError::Unauthorized("no key".into()), StatusCode::UNAUTHORIZED),
            (
                BotvisorError::UnitExitedEarly {
                    name: "a".into(),
                    exit_code: Some(1),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let (status, kind) = ServerError::from(error).status_and_kind();
            assert_eq!(status, expected, "{}", kind);
        }
    }
}
