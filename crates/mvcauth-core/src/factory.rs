//! Listener construction from configuration.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{
    open_store, DigestFileBackend, HtdigestFile, HtpasswdFile, PasswordFileBackend,
};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfigResolver;
use crate::error::{BackendError, ConfigError, ConfigResult};
use crate::listener::AuthenticationListener;
use crate::oauth2::GrantEngine;
use crate::policy::{AuthPolicy, HttpScheme};
use crate::registry::{CredentialVerifierRegistry, VerifierBackends};

/// Builds an [`AuthenticationListener`] and the backends it needs.
pub struct ListenerFactory;

impl ListenerFactory {
    /// Resolve `config` and build a listener using the system clock.
    pub fn from_config(config: &Value) -> ConfigResult<AuthenticationListener> {
        let policy = AuthConfigResolver::resolve(config)?;
        Self::from_policy(policy, Arc::new(SystemClock))
    }

    /// Open the backends referenced by `policy` and build a listener.
    pub fn from_policy(
        policy: AuthPolicy,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<AuthenticationListener> {
        let password = match policy.basic_resolver_source() {
            Some(path) if policy.accepts(HttpScheme::Basic) => {
                let file = HtpasswdFile::open(path)
                    .map_err(|e| backend_error("htpasswd file", path, e))?;
                tracing::info!(path = %path.display(), users = file.len(), "loaded htpasswd file");
                Some(Arc::new(file) as Arc<dyn PasswordFileBackend>)
            }
            _ => None,
        };

        let digest = match policy.digest_resolver_source() {
            Some(path) if policy.accepts(HttpScheme::Digest) => {
                let file = HtdigestFile::open(path)
                    .map_err(|e| backend_error("htdigest file", path, e))?;
                tracing::info!(path = %path.display(), users = file.len(), "loaded htdigest file");
                Some(Arc::new(file) as Arc<dyn DigestFileBackend>)
            }
            _ => None,
        };

        let grant_engine = match policy.oauth2() {
            Some(oauth2) => {
                let store = open_store(&oauth2.store)?;
                Some(Arc::new(GrantEngine::new(store, oauth2, clock.clone())))
            }
            None => None,
        };

        let registry = CredentialVerifierRegistry::build(
            &policy,
            VerifierBackends {
                password,
                digest,
                grant_engine: grant_engine.clone(),
            },
            clock,
        );

        if registry.is_empty() {
            tracing::info!("no authentication configured, all requests are unauthenticated");
        } else {
            tracing::info!(schemes = ?registry.schemes(), "authentication listener ready");
        }

        Ok(AuthenticationListener::new(policy, registry, grant_engine))
    }
}

fn backend_error(kind: &str, path: &Path, err: BackendError) -> ConfigError {
    ConfigError::Backend {
        backend: format!("{} {}", kind, path.display()),
        reason: err.to_string(),
    }
}
