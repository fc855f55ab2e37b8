//! Authenticated principal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::oauth2::parse_scope;

/// Authentication scheme a verifier implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Basic,
    Digest,
    Bearer,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "basic",
            AuthScheme::Digest => "digest",
            AuthScheme::Bearer => "bearer",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Principal produced by a successful verification.
///
/// Scoped to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User name, or the OAuth2 resource owner (client id when the token has
    /// no resource owner).
    pub subject: String,
    /// Scheme of the verifier that produced this identity.
    pub scheme: AuthScheme,
    /// OAuth2 client the bearer token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Space-delimited OAuth2 scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Bearer token expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Identity for a user verified by an HTTP scheme.
    pub fn http(subject: impl Into<String>, scheme: AuthScheme) -> Self {
        Self {
            subject: subject.into(),
            scheme,
            client_id: None,
            scope: None,
            expires_at: None,
        }
    }

    /// Whether the identity carries every scope in `required`.
    ///
    /// Identities from HTTP schemes carry no scope.
    pub fn has_scope(&self, required: &str) -> bool {
        let granted = self.scope.as_deref().map(parse_scope).unwrap_or_default();
        parse_scope(required).is_subset(&granted)
    }
}
