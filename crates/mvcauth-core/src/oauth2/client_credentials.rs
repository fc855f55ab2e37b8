//! `client_credentials` grant (RFC 6749 section 4.4).

use super::grant::{GrantRequest, GrantType, TokenIssuer};
use super::{TokenRecord, CLIENT_CREDENTIALS};
use crate::error::{GrantError, GrantErrorKind, GrantResult};

/// Issues a token to a confidential client for its own account.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientCredentialsGrant;

impl GrantType for ClientCredentialsGrant {
    fn grant_type(&self) -> &'static str {
        CLIENT_CREDENTIALS
    }

    fn grant(&self, request: &GrantRequest, issuer: &TokenIssuer) -> GrantResult<TokenRecord> {
        let client = issuer.authenticate_client(request, CLIENT_CREDENTIALS)?;
        if client.is_public() {
            return Err(GrantError::rejected(
                GrantErrorKind::UnauthorizedClient,
                "public clients may not use client_credentials",
            ));
        }

        let scope = issuer.resolve_scope(&client, request.scope.as_deref())?;
        issuer.issue(&client.client_id, client.user_id.clone(), scope)
    }
}
