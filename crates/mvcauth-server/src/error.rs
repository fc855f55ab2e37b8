//! Error handling for the server.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mvcauth_core::{BackendError, GrantError, GrantErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication is required or the presented credentials were rejected.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// `WWW-Authenticate` values, one per enabled scheme.
        challenges: Vec<String>,
        message: String,
    },

    /// Authenticated, but not allowed to perform the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// OAuth2 request rejected, or the store failed while serving it.
    #[error(transparent)]
    Grant(#[from] GrantError),

    /// A credential or token backend is unavailable.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// OAuth2 error response body (RFC 6749 section 5.2).
#[derive(Serialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    pub error_description: String,
}

fn grant_status(kind: GrantErrorKind) -> StatusCode {
    match kind {
        GrantErrorKind::InvalidClient | GrantErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
        GrantErrorKind::InsufficientScope => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let body = ErrorResponse {
        error: true,
        code: code.to_string(),
        message,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized {
                challenges,
                message,
            } => {
                let mut response = error_body(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message);
                let headers = response.headers_mut();
                for challenge in challenges {
                    if let Ok(value) = HeaderValue::from_str(&challenge) {
                        headers.append(header::WWW_AUTHENTICATE, value);
                    }
                }
                response
            }
            AppError::Grant(GrantError::Rejected { kind, description }) => {
                let body = OAuthErrorResponse {
                    error: kind.as_str().to_string(),
                    error_description: description,
                };
                let mut response = (grant_status(kind), Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                response
            }
            AppError::Grant(GrantError::Backend(err)) | AppError::Backend(err) => {
                tracing::error!(error = %err, "backend unavailable");
                error_body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    err.to_string(),
                )
            }
            AppError::Forbidden(msg) => error_body(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Internal(msg) => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("authentication task failed: {}", err))
    }
}
