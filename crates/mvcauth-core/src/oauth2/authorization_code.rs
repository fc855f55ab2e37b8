//! `authorization_code` grant (RFC 6749 section 4.1.3).

use super::grant::{GrantRequest, GrantType, TokenIssuer};
use super::{TokenRecord, AUTHORIZATION_CODE};
use crate::error::{GrantError, GrantResult};

/// Exchanges a single-use authorization code for a token.
///
/// The code is consumed before it is checked, so a code presented with the
/// wrong client, an old redirect URI or after expiry is burnt as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorizationCodeGrant;

impl GrantType for AuthorizationCodeGrant {
    fn grant_type(&self) -> &'static str {
        AUTHORIZATION_CODE
    }

    fn grant(&self, request: &GrantRequest, issuer: &TokenIssuer) -> GrantResult<TokenRecord> {
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GrantError::invalid_request("missing parameter: \"code\" is required"))?;

        let client = issuer.authenticate_client(request, AUTHORIZATION_CODE)?;

        let Some(record) = issuer.store().consume_authorization_code(code)? else {
            return Err(GrantError::invalid_grant(
                "authorization code doesn't exist or is invalid for the client",
            ));
        };

        if record.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                "authorization code presented by another client"
            );
            return Err(GrantError::invalid_grant(
                "authorization code doesn't exist or is invalid for the client",
            ));
        }
        if record.is_expired(issuer.now()) {
            return Err(GrantError::invalid_grant("the authorization code has expired"));
        }
        if let Some(bound) = &record.redirect_uri {
            if request.redirect_uri.as_deref() != Some(bound.as_str()) {
                return Err(GrantError::invalid_grant(
                    "the redirect URI is missing or does not match",
                ));
            }
        }

        issuer.issue(&client.client_id, record.user_id, record.scope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::backend::{MemoryOAuth2Store, OAuth2StoreBackend};
    use crate::clock::{Clock, ManualClock};
    use crate::error::GrantErrorKind;
    use crate::oauth2::{AuthorizationCodeRecord, ClientRecord};

    struct Fixture {
        issuer: TokenIssuer,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = MemoryOAuth2Store::new();
        store
            .put_client(
                &ClientRecord::new("web")
                    .with_secret("s3cret")
                    .with_redirect_uri("https://app.example/cb"),
            )
            .unwrap();
        store.put_client(&ClientRecord::new("other")).unwrap();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let code = AuthorizationCodeRecord {
            code: "abc".to_string(),
            client_id: "web".to_string(),
            user_id: Some("alice".to_string()),
            redirect_uri: Some("https://app.example/cb".to_string()),
            expires_at: clock.now() + chrono::Duration::seconds(30),
            scope: Some("read".to_string()),
        };
        store.put_authorization_code(&code).unwrap();

        Fixture {
            issuer: TokenIssuer::new(Arc::new(store), clock.clone(), Duration::from_secs(60)),
            clock,
        }
    }

    fn exchange() -> GrantRequest {
        GrantRequest::new(AUTHORIZATION_CODE)
            .with_client("web", Some("s3cret"))
            .with_code("abc")
            .with_redirect_uri("https://app.example/cb")
    }

    #[test]
    fn test_exchange_then_replay() {
        let f = fixture();

        let token = AuthorizationCodeGrant.grant(&exchange(), &f.issuer).unwrap();
        assert_eq!(token.client_id, "web");
        assert_eq!(token.user_id.as_deref(), Some("alice"));
        assert_eq!(token.scope.as_deref(), Some("read"));

        let err = AuthorizationCodeGrant.grant(&exchange(), &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidGrant));
    }

    #[test]
    fn test_expired_code() {
        let f = fixture();
        f.clock.advance(chrono::Duration::seconds(31));

        let err = AuthorizationCodeGrant.grant(&exchange(), &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidGrant));
    }

    #[test]
    fn test_redirect_uri_must_match() {
        let f = fixture();
        let request = exchange().with_redirect_uri("https://evil.example/cb");

        let err = AuthorizationCodeGrant.grant(&request, &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidGrant));
    }

    #[test]
    fn test_code_bound_to_client() {
        let f = fixture();
        let request = GrantRequest::new(AUTHORIZATION_CODE)
            .with_client("other", None)
            .with_code("abc")
            .with_redirect_uri("https://app.example/cb");

        let err = AuthorizationCodeGrant.grant(&request, &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidGrant));

        // burnt by the failed attempt
        assert!(AuthorizationCodeGrant.grant(&exchange(), &f.issuer).is_err());
    }

    #[test]
    fn test_client_authenticated_before_consuming() {
        let f = fixture();
        let request = GrantRequest::new(AUTHORIZATION_CODE)
            .with_client("web", Some("wrong"))
            .with_code("abc");

        let err = AuthorizationCodeGrant.grant(&request, &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidClient));
        assert!(AuthorizationCodeGrant.grant(&exchange(), &f.issuer).is_ok());
    }

    #[test]
    fn test_missing_code() {
        let f = fixture();
        let request = GrantRequest::new(AUTHORIZATION_CODE).with_client("web", Some("s3cret"));

        let err = AuthorizationCodeGrant.grant(&request, &f.issuer).unwrap_err();
        assert_eq!(err.kind(), Some(GrantErrorKind::InvalidRequest));
    }
}
