//! OAuth2 bearer token verification.

use std::sync::Arc;

use super::{precheck, quote, AuthRequest, CredentialVerifier, Credentials, FailureReason, Verdict};
use crate::error::{BackendResult, GrantError};
use crate::identity::AuthScheme;
use crate::oauth2::GrantEngine;

/// Verifies bearer tokens through the [`GrantEngine`].
pub struct BearerVerifier {
    engine: Arc<GrantEngine>,
    realm: String,
}

impl BearerVerifier {
    pub fn new(engine: Arc<GrantEngine>, realm: impl Into<String>) -> Self {
        Self {
            engine,
            realm: realm.into(),
        }
    }
}

impl CredentialVerifier for BearerVerifier {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    fn verify(&self, credentials: &Credentials, _request: &AuthRequest) -> BackendResult<Verdict> {
        if let Some(verdict) = precheck(credentials, AuthScheme::Bearer) {
            return Ok(verdict);
        }
        let Credentials::Bearer(token) = credentials else {
            return Ok(Verdict::Rejected(FailureReason::InvalidCredentials));
        };

        match self.engine.validate_token(token) {
            Ok(identity) => Ok(Verdict::Accepted(identity)),
            Err(GrantError::Rejected { description, .. }) => {
                tracing::warn!(reason = %description, "bearer token rejected");
                Ok(Verdict::Rejected(FailureReason::InvalidToken(description)))
            }
            Err(GrantError::Backend(err)) => Err(err),
        }
    }

    fn challenge(&self, failure: Option<&FailureReason>) -> String {
        let mut challenge = format!("Bearer realm={}", quote(&self.realm));
        match failure {
            Some(FailureReason::InvalidToken(description)) => {
                challenge.push_str(&format!(
                    ", error=\"invalid_token\", error_description={}",
                    quote(description)
                ));
            }
            Some(FailureReason::MalformedCredentials(_)) => {
                challenge.push_str(", error=\"invalid_request\"");
            }
            _ => {}
        }
        challenge
    }
}
