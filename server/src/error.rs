//! Error types for the Evently HTTP API.
//!
//! Every concern has its own `thiserror` enum ([`crate::config::ConfigError`],
//! [`crate::repository::RepositoryError`], [`crate::accounts::AccountError`],
//! [`crate::session::SessionError`], [`crate::auth::AuthError`]). Handlers
//! convert them into [`ApiError`], which decides the status code and body.
//!
//! # Response Mapping
//!
//! | Variant | Status | Body |
//! |---------|--------|------|
//! | `Validation` | 400 | HAL error list with an `index` link |
//! | `NotFound` | 404 | empty |
//! | `Unauthorized` | 401 | empty |
//! | `Auth` | 401 | `{error, code}` |
//! | `Conflict` | 409 | `{error, code}` |
//! | `Unavailable` | 503 | `{error, code}` |
//! | `Internal` | 500 | `{error, code}` |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::accounts::AccountError;
use crate::auth::AuthError;
use crate::hal::{ErrorsResource, Hal};
use crate::repository::RepositoryError;
use crate::session::SessionError;

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Error returned from HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Input failed validation.
    Validation(ErrorsResource),

    /// The addressed resource does not exist.
    NotFound,

    /// The requester may not perform this operation on the resource.
    Unauthorized,

    /// Credentials or bearer token were rejected.
    Auth(AuthError),

    /// The request conflicts with existing state.
    Conflict(String),

    /// A backing store cannot serve the request right now.
    Unavailable(String),

    /// Unexpected internal server error.
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => {
                write!(f, "validation failed with {} error(s)", errors.content.len())
            }
            Self::NotFound => write!(f, "not found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Auth(err) => write!(f, "authentication failed: {err}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Unavailable(msg) => write!(f, "service unavailable: {msg}"),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => Hal::with_status(status, errors).into_response(),
            Self::NotFound | Self::Unauthorized => status.into_response(),
            Self::Auth(err) => {
                (status, Json(ErrorResponse::new(err.to_string()).with_code(err.code())))
                    .into_response()
            }
            Self::Conflict(msg) => {
                (status, Json(ErrorResponse::new(msg).with_code("conflict"))).into_response()
            }
            Self::Unavailable(msg) => {
                error!(error = %msg, "Backing store unavailable");
                (
                    status,
                    Json(ErrorResponse::new("service unavailable").with_code("unavailable")),
                )
                    .into_response()
            }
            Self::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (
                    status,
                    Json(ErrorResponse::new("internal server error").with_code("internal_error")),
                )
                    .into_response()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => Self::NotFound,
            RepositoryError::Unavailable(msg) => Self::Unavailable(msg),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::DuplicateEmail(_) => Self::Conflict(err.to_string()),
            AccountError::BadCredentials => Self::Auth(AuthError::InvalidCredentials),
            AccountError::Unavailable => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Unavailable(err.to_string())
    }
}
