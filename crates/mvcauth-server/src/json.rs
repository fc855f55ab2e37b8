//! JSON request and response bodies.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Enabled authentication schemes.
    pub schemes: Vec<String>,
    /// Whether the OAuth2 endpoints are available.
    pub oauth2: bool,
}

/// Token endpoint form (`application/x-www-form-urlencoded`).
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

/// Authorization endpoint form.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeForm {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Authorization endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    /// Issued authorization code.
    pub code: String,
    /// Redirect URI with `code` and `state` appended.
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Revocation endpoint form (RFC 7009).
#[derive(Debug, Default, Deserialize)]
pub struct RevokeForm {
    pub token: Option<String>,
}

/// Revocation endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    /// Whether the token existed before the call.
    pub revoked: bool,
}
