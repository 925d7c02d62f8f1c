use crate::auth::{identity::Permission, resolver::ResolveError, token::TokenError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No credential in the Authorization header, `token` query parameter or `X-JWT` cookie
    #[error("No credential presented")]
    MissingCredential,

    /// Credential failed verification, or its subject could not be resolved
    #[error("Invalid credential: {cause}")]
    InvalidCredential { cause: InvalidCredentialCause },

    /// Identity was resolved but lacks a required permission
    #[error("Missing permission: {permission}")]
    InsufficientPermission { permission: Permission },

    /// Identity requested from a request that never passed the gate
    #[error("Not authenticated")]
    Unauthenticated,

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

/// Why a credential was rejected. Kept for logs and tests only: every cause
/// renders the same response so callers cannot tell which identifiers exist.
#[derive(ThisError, Debug)]
pub enum InvalidCredentialCause {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("identity lookup timed out after {0:?}")]
    ResolutionTimeout(Duration),
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        Error::InvalidCredential { cause: err.into() }
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        Error::InvalidCredential { cause: err.into() }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingCredential | Error::InvalidCredential { .. } | Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermission { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingCredential => "Missing or invalid token".to_string(),
            Error::InvalidCredential { .. } => "Invalid token".to_string(),
            Error::InsufficientPermission { permission } => format!("Missing permission: {permission}"),
            Error::Unauthenticated => "Unauthorized".to_string(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::MissingCredential | Error::InvalidCredential { .. } | Error::InsufficientPermission { .. } | Error::Unauthenticated => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "error": self.user_message() });
        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
