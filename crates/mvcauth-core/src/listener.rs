//! Per-request authentication dispatch.
//!
//! Each call to [`AuthenticationListener::authenticate`] walks one request
//! through
//!
//! ```text
//! Unchecked --> Checking --+--> Authenticated(identity)
//!                          +--> Unauthenticated
//!                          +--> Failed(scheme, reason)
//! ```
//!
//! Dispatch rules:
//! - a bearer token anywhere in the request is dispatched to the OAuth2
//!   verifier ahead of any `Basic` or `Digest` header, when OAuth2 is
//!   configured;
//! - otherwise the scheme named in the `Authorization` header picks the
//!   verifier;
//! - exactly one verifier runs per request and its verdict is final.

use std::sync::Arc;

use crate::error::BackendResult;
use crate::identity::{AuthScheme, Identity};
use crate::oauth2::GrantEngine;
use crate::policy::AuthPolicy;
use crate::registry::CredentialVerifierRegistry;
use crate::verifier::{AuthRequest, Credentials, FailureReason, Verdict};

/// Rejection details for a failed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Scheme of the verifier that rejected the credentials.
    pub scheme: AuthScheme,
    pub reason: FailureReason,
}

/// Outcome of authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// A verifier accepted the presented credentials.
    Authenticated(Identity),
    /// No credentials for any registered verifier were presented.
    Unauthenticated,
    /// A verifier was selected and rejected the credentials.
    Failed(AuthFailure),
}

impl AuthResult {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthResult::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuthResult::Failed(_))
    }
}

/// Authentication state of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unchecked,
    Checking,
    Authenticated(Identity),
    Unauthenticated,
    Failed(AuthFailure),
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthState::Authenticated(_) | AuthState::Unauthenticated | AuthState::Failed(_)
        )
    }

    /// `Unchecked -> Checking`. Other states are left as they are.
    fn begin(self) -> Self {
        match self {
            AuthState::Unchecked => AuthState::Checking,
            other => other,
        }
    }

    /// `Checking -> terminal`. Other states are left as they are.
    fn settle(self, result: AuthResult) -> Self {
        match self {
            AuthState::Checking => match result {
                AuthResult::Authenticated(identity) => AuthState::Authenticated(identity),
                AuthResult::Unauthenticated => AuthState::Unauthenticated,
                AuthResult::Failed(failure) => AuthState::Failed(failure),
            },
            other => other,
        }
    }

    fn into_result(self) -> Option<AuthResult> {
        match self {
            AuthState::Authenticated(identity) => Some(AuthResult::Authenticated(identity)),
            AuthState::Unauthenticated => Some(AuthResult::Unauthenticated),
            AuthState::Failed(failure) => Some(AuthResult::Failed(failure)),
            AuthState::Unchecked | AuthState::Checking => None,
        }
    }
}

/// Runs the registered verifiers against incoming requests.
pub struct AuthenticationListener {
    policy: AuthPolicy,
    registry: CredentialVerifierRegistry,
    grant_engine: Option<Arc<GrantEngine>>,
}

impl AuthenticationListener {
    pub fn new(
        policy: AuthPolicy,
        registry: CredentialVerifierRegistry,
        grant_engine: Option<Arc<GrantEngine>>,
    ) -> Self {
        Self {
            policy,
            registry,
            grant_engine,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &CredentialVerifierRegistry {
        &self.registry
    }

    /// OAuth2 grant engine, when OAuth2 is configured.
    pub fn grant_engine(&self) -> Option<&Arc<GrantEngine>> {
        self.grant_engine.as_ref()
    }

    /// Authenticate one request.
    ///
    /// Returns `Err` only when a backend fails; the request must then be
    /// answered as a server error, not as an authentication failure.
    pub fn authenticate(&self, request: &AuthRequest) -> BackendResult<AuthResult> {
        let state = AuthState::Unchecked.begin();
        let result = self.dispatch(request).map_err(|err| {
            tracing::error!(error = %err, uri = %request.uri, "authentication backend failed");
            err
        })?;

        Ok(state
            .settle(result)
            .into_result()
            .unwrap_or(AuthResult::Unauthenticated))
    }

    fn dispatch(&self, request: &AuthRequest) -> BackendResult<AuthResult> {
        let credentials = if self.registry.contains(AuthScheme::Bearer) {
            Credentials::from_request(request)
        } else {
            request
                .authorization
                .as_deref()
                .and_then(Credentials::parse_authorization)
        };

        let Some(credentials) = credentials else {
            tracing::debug!(uri = %request.uri, "no credentials presented");
            return Ok(AuthResult::Unauthenticated);
        };
        let scheme = credentials.scheme();
        let Some(verifier) = self.registry.select(&credentials) else {
            tracing::debug!(%scheme, uri = %request.uri, "no verifier for presented scheme");
            return Ok(AuthResult::Unauthenticated);
        };

        tracing::debug!(%scheme, uri = %request.uri, "verifying credentials");
        match verifier.verify(&credentials, request)? {
            Verdict::Accepted(identity) => {
                tracing::debug!(%scheme, subject = %identity.subject, "authenticated");
                Ok(AuthResult::Authenticated(identity))
            }
            Verdict::Rejected(reason) => Ok(AuthResult::Failed(AuthFailure { scheme, reason })),
        }
    }

    /// `WWW-Authenticate` values to send with a 401 for `result`.
    pub fn challenges(&self, result: &AuthResult) -> Vec<String> {
        match result {
            AuthResult::Failed(failure) => self
                .registry
                .challenges(Some((failure.scheme, &failure.reason))),
            _ => self.registry.challenges(None),
        }
    }
}
