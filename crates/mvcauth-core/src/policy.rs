//! Resolved authentication policy.
//!
//! An [`AuthPolicy`] is produced once by
//! [`AuthConfigResolver::resolve`](crate::config::AuthConfigResolver::resolve)
//! and never mutated afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Realm advertised in Bearer challenges when no HTTP realm is configured.
pub const DEFAULT_REALM: &str = "api";

/// Default OAuth2 access token lifetime (1 hour).
pub const DEFAULT_ACCESS_LIFETIME_SECS: u64 = 3600;

/// Default OAuth2 authorization code lifetime.
pub const DEFAULT_AUTH_CODE_LIFETIME_SECS: u64 = 30;

/// HTTP authentication schemes that can be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpScheme {
    /// RFC 7617 Basic.
    Basic,
    /// RFC 2617 Digest.
    Digest,
}

impl HttpScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpScheme::Basic => "basic",
            HttpScheme::Digest => "digest",
        }
    }
}

impl fmt::Display for HttpScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(HttpScheme::Basic),
            "digest" => Ok(HttpScheme::Digest),
            other => Err(format!("unsupported HTTP authentication scheme '{}'", other)),
        }
    }
}

/// Connection descriptor for the OAuth2 token/client store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Data source name, e.g. `sled:/var/lib/api/oauth2` or `memory:`.
    pub dsn: String,
    /// Optional store user.
    pub username: Option<String>,
    /// Optional store password.
    pub password: Option<String>,
}

impl StoreConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("dsn", &self.dsn)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// OAuth2 server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Policy {
    /// Token/client store.
    pub store: StoreConfig,
    /// Lifetime of issued access tokens.
    pub access_lifetime: Duration,
    /// Lifetime of issued authorization codes.
    pub auth_code_lifetime: Duration,
}

impl OAuth2Policy {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            access_lifetime: Duration::from_secs(DEFAULT_ACCESS_LIFETIME_SECS),
            auth_code_lifetime: Duration::from_secs(DEFAULT_AUTH_CODE_LIFETIME_SECS),
        }
    }
}

/// Resolved, immutable authentication policy.
///
/// Invariants established by the resolver:
/// - if `Digest` is enabled, `digest_domains` is non-empty and
///   `nonce_timeout` is set;
/// - a scheme is only enabled when its resolver source is configured;
/// - `realm` is set whenever any HTTP scheme is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthPolicy {
    pub(crate) http_schemes: BTreeSet<HttpScheme>,
    pub(crate) realm: Option<String>,
    pub(crate) digest_domains: Vec<String>,
    pub(crate) nonce_timeout: Option<Duration>,
    pub(crate) basic_resolver_source: Option<PathBuf>,
    pub(crate) digest_resolver_source: Option<PathBuf>,
    pub(crate) oauth2: Option<OAuth2Policy>,
}

impl AuthPolicy {
    /// A policy with every scheme disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled HTTP schemes; empty when HTTP authentication is disabled.
    pub fn http_schemes(&self) -> &BTreeSet<HttpScheme> {
        &self.http_schemes
    }

    pub fn accepts(&self, scheme: HttpScheme) -> bool {
        self.http_schemes.contains(&scheme)
    }

    /// Protection space identifier for HTTP challenges.
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    pub fn digest_domains(&self) -> &[String] {
        &self.digest_domains
    }

    pub fn nonce_timeout(&self) -> Option<Duration> {
        self.nonce_timeout
    }

    /// Path to the htpasswd file backing the Basic verifier.
    pub fn basic_resolver_source(&self) -> Option<&Path> {
        self.basic_resolver_source.as_deref()
    }

    /// Path to the htdigest file backing the Digest verifier.
    pub fn digest_resolver_source(&self) -> Option<&Path> {
        self.digest_resolver_source.as_deref()
    }

    pub fn oauth2(&self) -> Option<&OAuth2Policy> {
        self.oauth2.as_ref()
    }

    /// Whether any scheme at all is enabled.
    pub fn is_enabled(&self) -> bool {
        !self.http_schemes.is_empty() || self.oauth2.is_some()
    }
}
