//! Error types for configuration, storage backends and OAuth2 grants.
//!
//! Authentication failures are not errors: they are reported as
//! [`AuthResult::Failed`](crate::listener::AuthResult::Failed). The types in
//! this module cover the conditions that abort construction (`ConfigError`),
//! make a backend unusable for one request (`BackendError`), or reject an
//! OAuth2 token request (`GrantError`).

use std::fmt;

use thiserror::Error;

/// Startup configuration errors.
///
/// Raised once, while resolving the configuration tree or opening the
/// backends it references. Construction of the listener aborts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent from a configured section.
    #[error("{key} is required when configuring {section}")]
    MissingKey {
        /// Section being configured.
        section: &'static str,
        /// Missing key.
        key: &'static str,
    },

    /// Digest was requested without both of its required settings.
    #[error("both digest_domains and nonce_timeout are required for HTTP digest authentication")]
    DigestIncomplete,

    /// A key is present but its value cannot be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration tree does not have the expected shape.
    #[error("malformed configuration: {0}")]
    Malformed(String),

    /// A backend referenced by the configuration could not be opened.
    #[error("failed to open {backend}: {reason}")]
    Backend {
        /// Backend description (e.g. `htpasswd file /etc/api.htpasswd`).
        backend: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Backend I/O errors.
///
/// Fatal for the request that hit them, never for the process. Callers treat
/// these as a 5xx-class condition, distinct from an authentication failure.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store could not be reached or failed mid-operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sled::Error> for BackendError {
    fn from(err: sled::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// OAuth2 error codes (RFC 6749 section 5.2 and RFC 6750 section 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantErrorKind {
    /// Missing or malformed request parameter.
    InvalidRequest,
    /// Client authentication failed.
    InvalidClient,
    /// Authorization code is unknown, expired, already used or bound elsewhere.
    InvalidGrant,
    /// The client may not use the requested grant type.
    UnauthorizedClient,
    /// The grant type is not supported by this server.
    UnsupportedGrantType,
    /// The requested scope exceeds what the client may request.
    InvalidScope,
    /// The access token is absent, expired or revoked.
    InvalidToken,
    /// The access token does not carry a required scope.
    InsufficientScope,
}

impl GrantErrorKind {
    /// Wire code as sent in the `error` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantErrorKind::InvalidRequest => "invalid_request",
            GrantErrorKind::InvalidClient => "invalid_client",
            GrantErrorKind::InvalidGrant => "invalid_grant",
            GrantErrorKind::UnauthorizedClient => "unauthorized_client",
            GrantErrorKind::UnsupportedGrantType => "unsupported_grant_type",
            GrantErrorKind::InvalidScope => "invalid_scope",
            GrantErrorKind::InvalidToken => "invalid_token",
            GrantErrorKind::InsufficientScope => "insufficient_scope",
        }
    }
}

impl fmt::Display for GrantErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth2 grant and token-validation errors.
#[derive(Debug, Error)]
pub enum GrantError {
    /// The request was understood and rejected.
    #[error("{kind}: {description}")]
    Rejected {
        /// OAuth2 error code.
        kind: GrantErrorKind,
        /// Human-readable description.
        description: String,
    },

    /// The store failed while serving the request.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GrantError {
    /// Build a rejection of the given kind.
    pub fn rejected(kind: GrantErrorKind, description: impl Into<String>) -> Self {
        GrantError::Rejected {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::rejected(GrantErrorKind::InvalidRequest, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::rejected(GrantErrorKind::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::rejected(GrantErrorKind::InvalidGrant, description)
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::rejected(GrantErrorKind::InvalidToken, description)
    }

    /// OAuth2 error code, if this is a rejection rather than a backend failure.
    pub fn kind(&self) -> Option<GrantErrorKind> {
        match self {
            GrantError::Rejected { kind, .. } => Some(*kind),
            GrantError::Backend(_) => None,
        }
    }

    /// Whether this error came from the store rather than the request.
    pub fn is_backend(&self) -> bool {
        matches!(self, GrantError::Backend(_))
    }
}

/// Result type for OAuth2 operations.
pub type GrantResult<T> = Result<T, GrantError>;
