//! Grant type strategy interface and the shared token issuer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{generate_token, ClientRecord, TokenRecord};
use crate::backend::OAuth2StoreBackend;
use crate::clock::Clock;
use crate::error::{GrantError, GrantErrorKind, GrantResult};

/// A token endpoint request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Authorization code, for `authorization_code`.
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    /// Requested space-delimited scope.
    pub scope: Option<String>,
}

impl GrantRequest {
    pub fn new(grant_type: impl Into<String>) -> Self {
        Self {
            grant_type: grant_type.into(),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>, secret: Option<&str>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = secret.map(str::to_string);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// A grant type strategy.
///
/// Implementations validate the request against the store and mint a token
/// through the [`TokenIssuer`].
pub trait GrantType: Send + Sync {
    /// `grant_type` parameter value this strategy handles.
    fn grant_type(&self) -> &'static str;

    fn grant(&self, request: &GrantRequest, issuer: &TokenIssuer) -> GrantResult<TokenRecord>;
}

/// Store access and token minting shared by all grant types.
pub struct TokenIssuer {
    store: Arc<dyn OAuth2StoreBackend>,
    clock: Arc<dyn Clock>,
    access_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn OAuth2StoreBackend>,
        clock: Arc<dyn Clock>,
        access_lifetime: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            access_lifetime,
        }
    }

    pub fn store(&self) -> &Arc<dyn OAuth2StoreBackend> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    /// Authenticate the requesting client for `grant_type`.
    ///
    /// Confidential clients must present their secret; public clients are
    /// identified by `client_id` alone.
    pub fn authenticate_client(
        &self,
        request: &GrantRequest,
        grant_type: &str,
    ) -> GrantResult<ClientRecord> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GrantError::invalid_client("client authentication required"))?;

        let client = self
            .store
            .get_client(client_id)?
            .ok_or_else(|| GrantError::invalid_client("client authentication failed"))?;

        if !client.is_public() {
            let secret = request.client_secret.as_deref().unwrap_or_default();
            if !client.verify_secret(secret) {
                return Err(GrantError::invalid_client("client authentication failed"));
            }
        }

        if !client.allows_grant(grant_type) {
            return Err(GrantError::rejected(
                GrantErrorKind::UnauthorizedClient,
                format!("the grant type {} is unauthorized for this client", grant_type),
            ));
        }

        Ok(client)
    }

    /// Scope to grant: the requested scope if the client may have it,
    /// otherwise the client's default scope.
    pub fn resolve_scope(
        &self,
        client: &ClientRecord,
        requested: Option<&str>,
    ) -> GrantResult<Option<String>> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(scope) if client.allows_scope(scope) => Ok(Some(scope.to_string())),
            Some(_) => Err(GrantError::rejected(
                GrantErrorKind::InvalidScope,
                "an unsupported scope was requested",
            )),
            None => Ok(client.scope.clone()),
        }
    }

    /// Mint and store an access token.
    pub fn issue(
        &self,
        client_id: &str,
        user_id: Option<String>,
        scope: Option<String>,
    ) -> GrantResult<TokenRecord> {
        let record = TokenRecord {
            access_token: generate_token(),
            client_id: client_id.to_string(),
            user_id,
            expires_at: expiry(self.now(), self.access_lifetime),
            scope,
        };
        self.store.put_access_token(&record)?;
        Ok(record)
    }
}

/// `now + lifetime`, saturating at the latest representable instant.
pub(crate) fn expiry(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
