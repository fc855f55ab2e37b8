//! HTTP Basic verification against a password file.

use std::sync::Arc;

use super::{precheck, quote, AuthRequest, CredentialVerifier, Credentials, FailureReason, Verdict};
use crate::backend::{verify_password, PasswordFileBackend};
use crate::error::BackendResult;
use crate::identity::{AuthScheme, Identity};

/// Verifies Basic credentials against a [`PasswordFileBackend`].
pub struct BasicVerifier {
    backend: Arc<dyn PasswordFileBackend>,
    realm: String,
}

impl BasicVerifier {
    pub fn new(backend: Arc<dyn PasswordFileBackend>, realm: impl Into<String>) -> Self {
        Self {
            backend,
            realm: realm.into(),
        }
    }
}

impl CredentialVerifier for BasicVerifier {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn verify(&self, credentials: &Credentials, _request: &AuthRequest) -> BackendResult<Verdict> {
        if let Some(verdict) = precheck(credentials, AuthScheme::Basic) {
            return Ok(verdict);
        }
        let Credentials::Basic { username, password } = credentials else {
            return Ok(Verdict::Rejected(FailureReason::InvalidCredentials));
        };

        let verified = match self.backend.lookup(username)? {
            Some(hash) => verify_password(&hash, password),
            None => false,
        };

        if verified {
            Ok(Verdict::Accepted(Identity::http(username.clone(), AuthScheme::Basic)))
        } else {
            tracing::warn!(username = %username, "basic authentication rejected");
            Ok(Verdict::Rejected(FailureReason::InvalidCredentials))
        }
    }

    fn challenge(&self, _failure: Option<&FailureReason>) -> String {
        format!("Basic realm={}", quote(&self.realm))
    }
}
