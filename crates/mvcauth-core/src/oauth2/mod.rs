//! OAuth2 grant engine.
//!
//! The [`GrantEngine`] issues access tokens through pluggable [`GrantType`]
//! strategies and validates bearer tokens against the store:
//!
//! ```text
//! token request --> GrantEngine::issue_token --> GrantType::grant --> TokenIssuer::issue
//!                                                      |                    |
//!                                                      v                    v
//!                                              OAuth2StoreBackend <---------+
//! ```
//!
//! Two grant types are registered by default: `client_credentials` and
//! `authorization_code`.

mod authorization_code;
mod client_credentials;
mod grant;
mod records;

pub use authorization_code::AuthorizationCodeGrant;
pub use client_credentials::ClientCredentialsGrant;
pub use grant::{GrantRequest, GrantType, TokenIssuer};
pub use records::{
    generate_token, parse_scope, AuthorizationCodeRecord, ClientRecord, TokenRecord,
    TokenResponse,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use url::Url;

use crate::backend::OAuth2StoreBackend;
use crate::clock::Clock;
use crate::error::{BackendResult, GrantError, GrantErrorKind, GrantResult};
use crate::identity::{AuthScheme, Identity};
use crate::policy::OAuth2Policy;

/// `grant_type` value of the client credentials grant.
pub const CLIENT_CREDENTIALS: &str = "client_credentials";

/// `grant_type` value of the authorization code grant.
pub const AUTHORIZATION_CODE: &str = "authorization_code";

/// Minimum time between two sweeps of expired tokens and codes.
const PURGE_INTERVAL_SECS: i64 = 60;

/// Issues and validates OAuth2 access tokens.
pub struct GrantEngine {
    issuer: TokenIssuer,
    grants: HashMap<&'static str, Box<dyn GrantType>>,
    auth_code_lifetime: Duration,
    last_purge: Mutex<Option<DateTime<Utc>>>,
}

impl GrantEngine {
    /// Create an engine with the default grant types registered.
    pub fn new(
        store: Arc<dyn OAuth2StoreBackend>,
        policy: &OAuth2Policy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut engine = Self {
            issuer: TokenIssuer::new(store, clock, policy.access_lifetime),
            grants: HashMap::new(),
            auth_code_lifetime: policy.auth_code_lifetime,
            last_purge: Mutex::new(None),
        };
        engine.add_grant_type(Box::new(ClientCredentialsGrant));
        engine.add_grant_type(Box::new(AuthorizationCodeGrant));
        engine
    }

    /// Register a grant type, replacing any strategy for the same name.
    pub fn add_grant_type(&mut self, grant: Box<dyn GrantType>) {
        self.grants.insert(grant.grant_type(), grant);
    }

    pub fn supports(&self, grant_type: &str) -> bool {
        self.grants.contains_key(grant_type)
    }

    pub fn store(&self) -> &Arc<dyn OAuth2StoreBackend> {
        self.issuer.store()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.issuer.now()
    }

    /// Insert or replace a client.
    pub fn register_client(&self, client: &ClientRecord) -> BackendResult<()> {
        self.store().put_client(client)?;
        tracing::info!(client_id = %client.client_id, "registered OAuth2 client");
        Ok(())
    }

    /// Remove expired access tokens and authorization codes from the store.
    pub fn purge_expired(&self) -> BackendResult<usize> {
        let now = self.now();
        let removed = self.store().purge_expired(now)?;
        *self.last_purge.lock() = Some(now);
        if removed > 0 {
            tracing::debug!(removed, "purged expired OAuth2 entries");
        }
        Ok(removed)
    }

    /// Sweep the store when the last sweep is older than the purge interval.
    /// Runs before every write so the store stays bounded by live entries.
    fn purge_if_due(&self) {
        let now = self.now();
        let due = self
            .last_purge
            .lock()
            .map_or(true, |last| now - last >= chrono::Duration::seconds(PURGE_INTERVAL_SECS));
        if !due {
            return;
        }
        if let Err(err) = self.purge_expired() {
            tracing::warn!(error = %err, "failed to purge expired OAuth2 entries");
        }
    }

    /// Handle a token request.
    pub fn issue_token(&self, request: &GrantRequest) -> GrantResult<TokenRecord> {
        if request.grant_type.is_empty() {
            return Err(GrantError::invalid_request(
                "the grant type was not specified in the request",
            ));
        }
        let Some(grant) = self.grants.get(request.grant_type.as_str()) else {
            return Err(GrantError::rejected(
                GrantErrorKind::UnsupportedGrantType,
                format!("grant type \"{}\" not supported", request.grant_type),
            ));
        };

        self.purge_if_due();
        match grant.grant(request, &self.issuer) {
            Ok(record) => {
                tracing::info!(
                    client_id = %record.client_id,
                    grant_type = grant.grant_type(),
                    "issued access token"
                );
                Ok(record)
            }
            Err(err) => {
                if err.is_backend() {
                    tracing::error!(error = %err, "token request failed");
                } else {
                    tracing::warn!(
                        grant_type = grant.grant_type(),
                        client_id = request.client_id.as_deref().unwrap_or_default(),
                        error = %err,
                        "token request rejected"
                    );
                }
                Err(err)
            }
        }
    }

    /// Response body for a freshly issued token.
    pub fn token_response(&self, record: &TokenRecord) -> TokenResponse {
        TokenResponse::from_record(record, self.now())
    }

    /// Resolve a bearer token to the identity it was issued for.
    pub fn validate_token(&self, token: &str) -> GrantResult<Identity> {
        let Some(record) = self.store().get_access_token(token)? else {
            return Err(GrantError::invalid_token("the access token provided is invalid"));
        };
        if record.is_expired(self.now()) {
            return Err(GrantError::invalid_token("the access token provided has expired"));
        }

        Ok(Identity {
            subject: record.user_id.unwrap_or_else(|| record.client_id.clone()),
            scheme: AuthScheme::Bearer,
            client_id: Some(record.client_id),
            scope: record.scope,
            expires_at: Some(record.expires_at),
        })
    }

    /// Like [`validate_token`](Self::validate_token), additionally requiring
    /// every scope in `required`.
    pub fn validate_token_with_scope(&self, token: &str, required: &str) -> GrantResult<Identity> {
        let identity = self.validate_token(token)?;
        if !identity.has_scope(required) {
            return Err(GrantError::rejected(
                GrantErrorKind::InsufficientScope,
                "the request requires higher privileges than provided by the access token",
            ));
        }
        Ok(identity)
    }

    /// Issue an authorization code for `client_id` on behalf of `user_id`.
    ///
    /// When the client has a registered redirect URI, a supplied one must
    /// match it; otherwise a redirect URI must be supplied.
    pub fn issue_authorization_code(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: Option<&str>,
        scope: Option<&str>,
    ) -> GrantResult<AuthorizationCodeRecord> {
        let client = self
            .store()
            .get_client(client_id)?
            .ok_or_else(|| GrantError::invalid_client("no client id supplied or unknown client"))?;

        if !client.allows_grant(AUTHORIZATION_CODE) {
            return Err(GrantError::rejected(
                GrantErrorKind::UnauthorizedClient,
                "the grant type is unauthorized for this client_id",
            ));
        }

        let redirect_uri = match (client.redirect_uri.as_deref(), redirect_uri) {
            (Some(registered), Some(given)) if registered != given => {
                return Err(GrantError::invalid_request(
                    "the redirect URI provided does not match the registered one",
                ));
            }
            (Some(registered), _) => registered.to_string(),
            (None, Some(given)) if !given.is_empty() => given.to_string(),
            (None, _) => {
                return Err(GrantError::invalid_request(
                    "no redirect URI was supplied or stored",
                ));
            }
        };
        check_redirect_uri(&redirect_uri)?;

        let scope = self.issuer.resolve_scope(&client, scope)?;
        self.purge_if_due();
        let record = AuthorizationCodeRecord {
            code: generate_token(),
            client_id: client.client_id,
            user_id: Some(user_id.to_string()),
            redirect_uri: Some(redirect_uri),
            expires_at: grant::expiry(self.now(), self.auth_code_lifetime),
            scope,
        };
        self.store().put_authorization_code(&record)?;

        tracing::info!(client_id, user_id, "issued authorization code");
        Ok(record)
    }

    /// Revoke an access token. Returns whether it existed.
    pub fn revoke_token(&self, token: &str) -> BackendResult<bool> {
        let revoked = self.store().revoke_access_token(token)?;
        if revoked {
            tracing::info!("revoked access token");
        }
        Ok(revoked)
    }
}

/// A redirect URI must be absolute and carry no fragment (RFC 6749 section 3.1.2).
fn check_redirect_uri(uri: &str) -> GrantResult<()> {
    let parsed = Url::parse(uri).map_err(|e| {
        GrantError::invalid_request(format!("the redirect URI is not a valid absolute URI: {}", e))
    })?;
    if parsed.fragment().is_some() {
        return Err(GrantError::invalid_request(
            "the redirect URI must not include a fragment",
        ));
    }
    Ok(())
}
