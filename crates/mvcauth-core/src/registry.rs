//! Registry of credential verifiers, keyed by scheme.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{DigestFileBackend, PasswordFileBackend};
use crate::clock::Clock;
use crate::identity::AuthScheme;
use crate::oauth2::GrantEngine;
use crate::policy::{AuthPolicy, HttpScheme, DEFAULT_REALM};
use crate::verifier::{
    BasicVerifier, BearerVerifier, CredentialVerifier, Credentials, DigestVerifier, FailureReason,
    NonceManager,
};

/// Backends the registry binds verifiers to.
#[derive(Default, Clone)]
pub struct VerifierBackends {
    pub password: Option<Arc<dyn PasswordFileBackend>>,
    pub digest: Option<Arc<dyn DigestFileBackend>>,
    pub grant_engine: Option<Arc<GrantEngine>>,
}

/// Holds at most one verifier per scheme.
#[derive(Default, Clone)]
pub struct CredentialVerifierRegistry {
    verifiers: BTreeMap<AuthScheme, Arc<dyn CredentialVerifier>>,
}

impl CredentialVerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the verifiers enabled by `policy`.
    ///
    /// A scheme enabled by the policy but lacking a backend is skipped with a
    /// warning.
    pub fn build(policy: &AuthPolicy, backends: VerifierBackends, clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self::new();
        let realm = policy.realm().unwrap_or(DEFAULT_REALM);

        if policy.accepts(HttpScheme::Basic) {
            match backends.password {
                Some(backend) => {
                    registry.register(Arc::new(BasicVerifier::new(backend, realm)));
                }
                None => tracing::warn!("basic authentication enabled without a password backend"),
            }
        }

        if policy.accepts(HttpScheme::Digest) {
            match (backends.digest, policy.nonce_timeout()) {
                (Some(backend), Some(timeout)) => {
                    let nonces = NonceManager::new(realm, timeout, clock);
                    registry.register(Arc::new(DigestVerifier::new(
                        backend,
                        realm,
                        policy.digest_domains().to_vec(),
                        nonces,
                    )));
                }
                _ => tracing::warn!("digest authentication enabled without a digest backend"),
            }
        }

        if let Some(engine) = backends.grant_engine {
            registry.register(Arc::new(BearerVerifier::new(engine, realm)));
        }

        registry
    }

    /// Add a verifier, returning the one it replaced.
    pub fn register(
        &mut self,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Option<Arc<dyn CredentialVerifier>> {
        let scheme = verifier.scheme();
        tracing::debug!(%scheme, "registered credential verifier");
        self.verifiers.insert(scheme, verifier)
    }

    /// Verifier for the scheme the credentials were presented under.
    pub fn select(&self, credentials: &Credentials) -> Option<&Arc<dyn CredentialVerifier>> {
        self.get(credentials.scheme())
    }

    pub fn get(&self, scheme: AuthScheme) -> Option<&Arc<dyn CredentialVerifier>> {
        self.verifiers.get(&scheme)
    }

    pub fn contains(&self, scheme: AuthScheme) -> bool {
        self.verifiers.contains_key(&scheme)
    }

    /// Registered schemes, in `Basic`, `Digest`, `Bearer` order.
    pub fn schemes(&self) -> Vec<AuthScheme> {
        self.verifiers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }

    /// `WWW-Authenticate` values for every registered scheme.
    ///
    /// `failure` tailors the challenge of the scheme that rejected the
    /// request.
    pub fn challenges(&self, failure: Option<(AuthScheme, &FailureReason)>) -> Vec<String> {
        self.verifiers
            .iter()
            .map(|(scheme, verifier)| {
                let reason = failure
                    .filter(|(failed, _)| failed == scheme)
                    .map(|(_, reason)| reason);
                verifier.challenge(reason)
            })
            .collect()
    }
}
