//! Credential and token storage backends.
//!
//! The verifiers and the grant engine only talk to storage through the
//! traits defined here:
//!
//! - [`PasswordFileBackend`]: Basic credentials (htpasswd)
//! - [`DigestFileBackend`]: Digest credentials (htdigest)
//! - [`OAuth2StoreBackend`]: clients, access tokens and authorization codes
//!
//! Implementations must tolerate concurrent readers. Writes to the OAuth2
//! store are serialised by the implementation, and
//! [`OAuth2StoreBackend::consume_authorization_code`] must be atomic.

mod htdigest;
mod htpasswd;
mod memory;
mod sled_store;

pub use htdigest::{digest_ha1, HtdigestFile};
pub use htpasswd::{apr1_crypt, sha1_hash, verify_password, HtpasswdFile};
pub use memory::MemoryOAuth2Store;
pub use sled_store::SledOAuth2Store;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{BackendResult, ConfigError, ConfigResult};
use crate::oauth2::{AuthorizationCodeRecord, ClientRecord, TokenRecord};
use crate::policy::StoreConfig;

/// Looks up password hashes by user name.
pub trait PasswordFileBackend: Send + Sync {
    /// Stored hash for `username`, or `None` if the user is unknown.
    fn lookup(&self, username: &str) -> BackendResult<Option<String>>;
}

/// Looks up Digest `HA1` values by user name and realm.
pub trait DigestFileBackend: Send + Sync {
    /// Stored `HA1` for `username` in `realm`, or `None` if unknown.
    fn lookup(&self, username: &str, realm: &str) -> BackendResult<Option<String>>;
}

/// Persistent OAuth2 client, token and authorization code store.
pub trait OAuth2StoreBackend: Send + Sync {
    fn get_client(&self, client_id: &str) -> BackendResult<Option<ClientRecord>>;

    /// Insert or replace a client.
    fn put_client(&self, client: &ClientRecord) -> BackendResult<()>;

    fn get_access_token(&self, token: &str) -> BackendResult<Option<TokenRecord>>;

    fn put_access_token(&self, token: &TokenRecord) -> BackendResult<()>;

    /// Remove an access token. Returns whether it existed.
    fn revoke_access_token(&self, token: &str) -> BackendResult<bool>;

    fn get_authorization_code(&self, code: &str) -> BackendResult<Option<AuthorizationCodeRecord>>;

    fn put_authorization_code(&self, code: &AuthorizationCodeRecord) -> BackendResult<()>;

    /// Atomically remove a code and return it.
    ///
    /// Of any number of concurrent calls for the same code, at most one
    /// returns `Some`.
    fn consume_authorization_code(
        &self,
        code: &str,
    ) -> BackendResult<Option<AuthorizationCodeRecord>>;

    /// Remove every access token and authorization code expired at `now`.
    /// Returns the number of entries removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> BackendResult<usize>;
}

/// Open the OAuth2 store named by `config.dsn`.
///
/// Supported DSNs:
/// - `memory:`: process-local store
/// - `sled:<path>`: sled database at `<path>`
pub fn open_store(config: &StoreConfig) -> ConfigResult<Arc<dyn OAuth2StoreBackend>> {
    let dsn = config.dsn.trim();

    if dsn == "memory:" || dsn == "memory" {
        tracing::info!("using in-memory OAuth2 store");
        return Ok(Arc::new(MemoryOAuth2Store::new()));
    }

    if let Some(path) = dsn.strip_prefix("sled:") {
        let path = path.strip_prefix("//").unwrap_or(path);
        if path.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "dsn",
                reason: "sled DSN requires a path".to_string(),
            });
        }
        let store = SledOAuth2Store::open_path(path).map_err(|e| ConfigError::Backend {
            backend: format!("OAuth2 store {}", dsn),
            reason: e.to_string(),
        })?;
        tracing::info!(path, "opened sled OAuth2 store");
        return Ok(Arc::new(store));
    }

    Err(ConfigError::InvalidValue {
        key: "dsn",
        reason: format!("unsupported store driver in '{}'", dsn),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_store() {
        let store = open_store(&StoreConfig::new("memory:")).unwrap();
        assert!(store.get_client("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("sled:{}", dir.path().join("oauth2").display());
        let store = open_store(&StoreConfig::new(dsn)).unwrap();
        store.put_client(&ClientRecord::new("svc")).unwrap();
        assert!(store.get_client("svc").unwrap().is_some());
    }

    #[test]
    fn test_unsupported_dsn() {
        let err = open_store(&StoreConfig::new("mysql:host=localhost;dbname=oauth")).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { key: "dsn", .. })));

        let err = open_store(&StoreConfig::new("sled:")).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { .. })));
    }
}
