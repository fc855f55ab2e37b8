//! OAuth2 entities persisted by the store backend.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Split a space-delimited scope string into its members.
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Generate an opaque token: 40 lowercase hex characters.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A registered OAuth2 client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    /// SHA-256 of the client secret (hex). `None` for public clients.
    pub secret_hash: Option<String>,
    /// Registered redirect URI.
    pub redirect_uri: Option<String>,
    /// Grant types the client may use. `None` allows all supported grants.
    pub grant_types: Option<Vec<String>>,
    /// Space-delimited scopes the client may request. `None` allows any scope.
    pub scope: Option<String>,
    /// Resource owner the client acts for under `client_credentials`.
    pub user_id: Option<String>,
}

impl ClientRecord {
    /// Create a public client.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret_hash: None,
            redirect_uri: None,
            grant_types: None,
            scope: None,
            user_id: None,
        }
    }

    /// Make this a confidential client with the given secret.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret_hash = Some(hash_secret(secret));
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_grant_types(mut self, grant_types: &[&str]) -> Self {
        self.grant_types = Some(grant_types.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn is_public(&self) -> bool {
        self.secret_hash.is_none()
    }

    /// Check a presented secret. Public clients never match.
    pub fn verify_secret(&self, secret: &str) -> bool {
        match &self.secret_hash {
            Some(expected) => {
                let actual = hash_secret(secret);
                actual.as_bytes().ct_eq(expected.as_bytes()).into()
            }
            None => false,
        }
    }

    /// Whether the client may use `grant_type`.
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|g| g == grant_type))
    }

    /// Whether every scope in `requested` is within the client's scope.
    pub fn allows_scope(&self, requested: &str) -> bool {
        match &self.scope {
            Some(allowed) => parse_scope(requested).is_subset(&parse_scope(allowed)),
            None => true,
        }
    }
}

fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub client_id: String,
    /// Resource owner the token was issued for, if any.
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Space-delimited granted scope.
    pub scope: Option<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    pub fn has_scope(&self, required: &str) -> bool {
        let granted = self.scope.as_deref().map(parse_scope).unwrap_or_default();
        parse_scope(required).is_subset(&granted)
    }
}

/// A single-use authorization code awaiting exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeRecord {
    pub code: String,
    pub client_id: String,
    pub user_id: Option<String>,
    /// Redirect URI the code was issued for; the exchange must repeat it.
    pub redirect_uri: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl AuthorizationCodeRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Successful token endpoint response body (RFC 6749 section 5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            access_token: record.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: record.expires_in(now),
            scope: record.scope.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_client_secret() {
        let client = ClientRecord::new("svc").with_secret("s3cret");
        assert!(!client.is_public());
        assert!(client.verify_secret("s3cret"));
        assert!(!client.verify_secret("S3cret"));

        let public = ClientRecord::new("spa");
        assert!(public.is_public());
        assert!(!public.verify_secret(""));
    }

    #[test]
    fn test_client_restrictions() {
        let client = ClientRecord::new("svc")
            .with_grant_types(&["client_credentials"])
            .with_scope("read write");

        assert!(client.allows_grant("client_credentials"));
        assert!(!client.allows_grant("authorization_code"));
        assert!(client.allows_scope("read"));
        assert!(client.allows_scope("write read"));
        assert!(!client.allows_scope("read admin"));

        let open = ClientRecord::new("any");
        assert!(open.allows_grant("authorization_code"));
        assert!(open.allows_scope("admin"));
    }

    #[test]
    fn test_token_expiry_and_scope() {
        let now = Utc::now();
        let token = TokenRecord {
            access_token: generate_token(),
            client_id: "svc".to_string(),
            user_id: None,
            expires_at: now + Duration::seconds(60),
            scope: Some("read write".to_string()),
        };

        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(60)));
        assert_eq!(token.expires_in(now), 60);
        assert_eq!(token.expires_in(now + Duration::seconds(120)), 0);
        assert!(token.has_scope("read"));
        assert!(!token.has_scope("admin"));
    }

    #[test]
    fn test_token_response_json() {
        let now = Utc::now();
        let token = TokenRecord {
            access_token: "abc".to_string(),
            client_id: "svc".to_string(),
            user_id: None,
            expires_at: now + Duration::seconds(3600),
            scope: None,
        };

        let json = serde_json::to_value(TokenResponse::from_record(&token, now)).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("scope").is_none());
    }
}
