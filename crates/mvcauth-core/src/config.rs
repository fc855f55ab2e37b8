//! Configuration resolution.
//!
//! Turns the raw configuration tree into an [`AuthPolicy`]. The tree uses the
//! following shape (only the keys read here are shown):
//!
//! ```text
//! {
//!   "api-tools-mvc-auth": {
//!     "authentication": {
//!       "http": {
//!         "accept_schemes": ["basic", "digest"],
//!         "realm": "api",
//!         "digest_domains": ["/api"],
//!         "nonce_timeout": 3600,
//!         "htpasswd": "/etc/api/htpasswd",
//!         "htdigest": "/etc/api/htdigest"
//!       }
//!     }
//!   },
//!   "api-tools-oauth2": {
//!     "db": { "dsn": "sled:/var/lib/api/oauth2", "username": null, "password": null },
//!     "access_lifetime": 3600,
//!     "auth_code_lifetime": 30
//!   }
//! }
//! ```
//!
//! An absent `http` block disables HTTP authentication, a present but
//! incomplete one is an error. A scheme whose password file is not
//! configured is disabled rather than rejected.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::policy::{
    AuthPolicy, HttpScheme, OAuth2Policy, StoreConfig, DEFAULT_ACCESS_LIFETIME_SECS,
    DEFAULT_AUTH_CODE_LIFETIME_SECS,
};

const HTTP_SECTION: &str = "an HTTP authentication adapter";
const OAUTH2_SECTION: &str = "the db for OAuth2 authentication";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "api-tools-mvc-auth", default)]
    mvc_auth: Option<RawMvcAuth>,
    #[serde(rename = "api-tools-oauth2", default)]
    oauth2: Option<RawOAuth2>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMvcAuth {
    #[serde(default)]
    authentication: Option<RawAuthentication>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthentication {
    #[serde(default)]
    http: Option<RawHttp>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHttp {
    #[serde(default)]
    accept_schemes: Option<Value>,
    #[serde(default)]
    realm: Option<String>,
    #[serde(default)]
    digest_domains: Option<RawDigestDomains>,
    #[serde(default)]
    nonce_timeout: Option<u64>,
    #[serde(default)]
    htpasswd: Option<PathBuf>,
    #[serde(default)]
    htdigest: Option<PathBuf>,
}

/// `digest_domains` is either a list or a single space-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDigestDomains {
    List(Vec<String>),
    Spaced(String),
}

impl RawDigestDomains {
    fn into_domains(self) -> Vec<String> {
        match self {
            RawDigestDomains::List(list) => list
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            RawDigestDomains::Spaced(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawOAuth2 {
    #[serde(default)]
    db: Option<RawDb>,
    #[serde(default)]
    access_lifetime: Option<u64>,
    #[serde(default)]
    auth_code_lifetime: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDb {
    #[serde(default)]
    dsn: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Validates and normalises the raw configuration tree.
pub struct AuthConfigResolver;

impl AuthConfigResolver {
    /// Resolve the configuration tree into a policy.
    ///
    /// Pure: nothing is opened or read from disk. `Value::Null` is treated as
    /// an empty tree.
    pub fn resolve(config: &Value) -> ConfigResult<AuthPolicy> {
        let raw: RawConfig = match config {
            Value::Null => RawConfig::default(),
            Value::Object(_) => serde_json::from_value(config.clone())
                .map_err(|e| ConfigError::Malformed(e.to_string()))?,
            _ => {
                return Err(ConfigError::Malformed(
                    "configuration root must be an object".to_string(),
                ))
            }
        };

        let mut policy = AuthPolicy::disabled();

        if let Some(http) = raw
            .mvc_auth
            .and_then(|m| m.authentication)
            .and_then(|a| a.http)
        {
            Self::resolve_http(http, &mut policy)?;
        }

        if let Some(oauth2) = raw.oauth2 {
            policy.oauth2 = Self::resolve_oauth2(oauth2)?;
        }

        tracing::debug!(
            http_schemes = ?policy.http_schemes,
            oauth2 = policy.oauth2.is_some(),
            "authentication policy resolved"
        );

        Ok(policy)
    }

    fn resolve_http(http: RawHttp, policy: &mut AuthPolicy) -> ConfigResult<()> {
        let requested = Self::parse_accept_schemes(http.accept_schemes)?;

        let realm = http.realm.ok_or(ConfigError::MissingKey {
            section: HTTP_SECTION,
            key: "realm",
        })?;

        if requested.contains(&HttpScheme::Digest) {
            let domains = http.digest_domains.map(RawDigestDomains::into_domains);
            let (domains, timeout) = match (domains, http.nonce_timeout) {
                (Some(domains), Some(timeout)) => (domains, timeout),
                _ => return Err(ConfigError::DigestIncomplete),
            };
            if domains.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "digest_domains",
                    reason: "at least one domain is required".to_string(),
                });
            }
            if timeout == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "nonce_timeout",
                    reason: "must be a positive number of seconds".to_string(),
                });
            }
            policy.digest_domains = domains;
            policy.nonce_timeout = Some(Duration::from_secs(timeout));
        }

        for scheme in requested {
            let source = match scheme {
                HttpScheme::Basic => http.htpasswd.clone(),
                HttpScheme::Digest => http.htdigest.clone(),
            };
            match source {
                Some(path) => {
                    match scheme {
                        HttpScheme::Basic => policy.basic_resolver_source = Some(path),
                        HttpScheme::Digest => policy.digest_resolver_source = Some(path),
                    }
                    policy.http_schemes.insert(scheme);
                }
                None => {
                    tracing::warn!(
                        scheme = %scheme,
                        "no password file configured, scheme disabled"
                    );
                }
            }
        }

        if !policy.http_schemes.is_empty() {
            policy.realm = Some(realm);
        }

        Ok(())
    }

    fn parse_accept_schemes(value: Option<Value>) -> ConfigResult<BTreeSet<HttpScheme>> {
        let missing = ConfigError::MissingKey {
            section: HTTP_SECTION,
            key: "accept_schemes",
        };
        let items = match value {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Err(missing),
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    key: "accept_schemes",
                    reason: "must be a list of scheme names".to_string(),
                })
            }
        };

        if items.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "accept_schemes",
                reason: "at least one scheme is required".to_string(),
            });
        }

        items
            .iter()
            .map(|item| {
                let name = item.as_str().ok_or_else(|| ConfigError::InvalidValue {
                    key: "accept_schemes",
                    reason: format!("scheme names must be strings, got {}", item),
                })?;
                name.parse::<HttpScheme>()
                    .map_err(|reason| ConfigError::InvalidValue {
                        key: "accept_schemes",
                        reason,
                    })
            })
            .collect()
    }

    fn resolve_oauth2(oauth2: RawOAuth2) -> ConfigResult<Option<OAuth2Policy>> {
        let Some(db) = oauth2.db else {
            return Ok(None);
        };

        let dsn = db
            .dsn
            .filter(|dsn| !dsn.trim().is_empty())
            .ok_or(ConfigError::MissingKey {
                section: OAUTH2_SECTION,
                key: "DSN",
            })?;

        let access_lifetime = oauth2.access_lifetime.unwrap_or(DEFAULT_ACCESS_LIFETIME_SECS);
        let auth_code_lifetime = oauth2
            .auth_code_lifetime
            .unwrap_or(DEFAULT_AUTH_CODE_LIFETIME_SECS);
        if access_lifetime == 0 || auth_code_lifetime == 0 {
            return Err(ConfigError::InvalidValue {
                key: "access_lifetime",
                reason: "token and code lifetimes must be positive".to_string(),
            });
        }

        Ok(Some(OAuth2Policy {
            store: StoreConfig {
                dsn,
                username: db.username,
                password: db.password,
            },
            access_lifetime: Duration::from_secs(access_lifetime),
            auth_code_lifetime: Duration::from_secs(auth_code_lifetime),
        }))
    }
}
