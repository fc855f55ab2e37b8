//! Credential verifiers.
//!
//! A verifier checks credentials of one scheme against one backend:
//!
//! - [`BasicVerifier`]: username/password against an htpasswd backend
//! - [`DigestVerifier`]: RFC 2617 digest response against an htdigest backend
//! - [`BearerVerifier`]: OAuth2 access token against the grant engine
//!
//! Verifiers never fall back to another scheme: credentials of the wrong
//! scheme are rejected.

mod basic;
mod bearer;
mod credentials;
mod digest;

pub use basic::BasicVerifier;
pub use bearer::BearerVerifier;
pub use credentials::{parse_auth_params, AuthRequest, Credentials, DigestCredentials};
pub use digest::{compute_response, DigestVerifier, NonceManager};

use thiserror::Error;

use crate::error::BackendResult;
use crate::identity::{AuthScheme, Identity};

/// Why presented credentials were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The credentials could not be decoded.
    #[error("malformed credentials: {0}")]
    MalformedCredentials(String),

    /// Unknown user or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Digest realm differs from the configured realm.
    #[error("realm mismatch")]
    RealmMismatch,

    /// Digest `uri` differs from the request URI.
    #[error("digest uri does not match request")]
    UriMismatch,

    /// Digest `opaque` was not issued by this server.
    #[error("opaque mismatch")]
    OpaqueMismatch,

    /// Digest algorithm or qop is not supported.
    #[error("unsupported digest parameter: {0}")]
    Unsupported(String),

    /// Digest nonce was issued longer ago than the nonce timeout.
    #[error("stale nonce")]
    StaleNonce,

    /// Digest nonce was not issued by this server.
    #[error("invalid nonce")]
    InvalidNonce,

    /// Bearer token absent from the store, expired or revoked.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Credentials were handed to a verifier of another scheme.
    #[error("credentials presented for {presented}, verifier accepts {expected}")]
    SchemeMismatch {
        presented: AuthScheme,
        expected: AuthScheme,
    },
}

/// Outcome of a single verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(Identity),
    Rejected(FailureReason),
}

/// Checks credentials of one scheme against one backend.
pub trait CredentialVerifier: Send + Sync {
    /// Scheme this verifier accepts.
    fn scheme(&self) -> AuthScheme;

    /// Verify `credentials` presented with `request`.
    ///
    /// Returns `Err` only when the backend fails; rejected credentials are
    /// `Ok(Verdict::Rejected(_))`.
    fn verify(&self, credentials: &Credentials, request: &AuthRequest) -> BackendResult<Verdict>;

    /// `WWW-Authenticate` challenge for this scheme, tailored to `failure`
    /// when the verifier rejected the request.
    fn challenge(&self, failure: Option<&FailureReason>) -> String;
}

/// Reject credentials that do not belong to `expected`, or malformed ones.
pub(crate) fn precheck(credentials: &Credentials, expected: AuthScheme) -> Option<Verdict> {
    let presented = credentials.scheme();
    if presented != expected {
        return Some(Verdict::Rejected(FailureReason::SchemeMismatch {
            presented,
            expected,
        }));
    }
    match credentials {
        Credentials::Malformed { reason, .. } => Some(Verdict::Rejected(
            FailureReason::MalformedCredentials(reason.clone()),
        )),
        _ => None,
    }
}

/// Quote a value for use in a challenge parameter.
pub(crate) fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
