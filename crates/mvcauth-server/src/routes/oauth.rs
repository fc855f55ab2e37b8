//! OAuth2 endpoints.
//!
//! - `POST /oauth`: token endpoint
//! - `POST /oauth/revoke`: token revocation
//! - `POST /oauth/authorize`: authorization code issuance for an
//!   HTTP-authenticated resource owner

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use mvcauth_core::{AuthScheme, Credentials, GrantEngine, GrantError, GrantRequest};
use url::Url;

use crate::auth::Authenticated;
use crate::error::AppError;
use crate::json::{AuthorizeForm, AuthorizeResponse, RevokeForm, RevokeResponse, TokenForm};
use crate::AppState;

/// Public OAuth2 routes; clients authenticate inside the handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/oauth", post(token))
        .route("/oauth/revoke", post(revoke))
}

/// Routes that require the authentication middleware.
pub fn authorize_routes() -> Router<AppState> {
    Router::new().route("/oauth/authorize", post(authorize))
}

fn grant_engine(state: &AppState) -> Result<Arc<GrantEngine>, AppError> {
    state
        .listener
        .grant_engine()
        .cloned()
        .ok_or_else(|| AppError::NotFound("OAuth2 is not configured".to_string()))
}

/// Client id and secret from an `Authorization: Basic` header.
fn basic_client_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| GrantError::invalid_client("malformed client credentials"))?;

    match Credentials::parse_authorization(value) {
        Some(Credentials::Basic { username, password }) => Ok(Some((username, password))),
        Some(Credentials::Malformed {
            scheme: AuthScheme::Basic,
            ..
        }) => Err(GrantError::invalid_client("malformed client credentials").into()),
        _ => Ok(None),
    }
}

/// Token endpoint.
async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Response, AppError> {
    let engine = grant_engine(&state)?;

    let mut request = GrantRequest {
        grant_type: form.grant_type.unwrap_or_default(),
        client_id: form.client_id,
        client_secret: form.client_secret,
        code: form.code,
        redirect_uri: form.redirect_uri,
        scope: form.scope,
    };
    if let Some((client_id, secret)) = basic_client_credentials(&headers)? {
        // RFC 6749 section 2.3: one client authentication method per request
        let form_id_differs = request.client_id.as_deref().is_some_and(|id| id != client_id);
        if request.client_secret.is_some() || form_id_differs {
            return Err(GrantError::invalid_request(
                "client credentials were supplied by more than one method",
            )
            .into());
        }
        request.client_id = Some(client_id);
        request.client_secret = Some(secret);
    }

    let response = tokio::task::spawn_blocking(move || {
        engine
            .issue_token(&request)
            .map(|record| engine.token_response(&record))
    })
    .await??;

    Ok((
        [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
        Json(response),
    )
        .into_response())
}

/// Revocation endpoint.
async fn revoke(
    State(state): State<AppState>,
    Form(form): Form<RevokeForm>,
) -> Result<Json<RevokeResponse>, AppError> {
    let engine = grant_engine(&state)?;
    let token = form
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GrantError::invalid_request("missing parameter: \"token\" is required"))?;

    let revoked = tokio::task::spawn_blocking(move || engine.revoke_token(&token)).await??;
    Ok(Json(RevokeResponse { revoked }))
}

/// Authorization endpoint.
async fn authorize(
    State(state): State<AppState>,
    Authenticated(owner): Authenticated,
    Form(form): Form<AuthorizeForm>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    if owner.scheme == AuthScheme::Bearer {
        return Err(AppError::Forbidden(
            "authorization requires an HTTP-authenticated resource owner".to_string(),
        ));
    }
    let engine = grant_engine(&state)?;

    if let Some(response_type) = form.response_type.as_deref() {
        if response_type != "code" {
            return Err(GrantError::invalid_request("response_type must be \"code\"").into());
        }
    }
    let client_id = form.client_id.filter(|c| !c.is_empty()).ok_or_else(|| {
        GrantError::invalid_request("missing parameter: \"client_id\" is required")
    })?;

    let redirect_uri = form.redirect_uri;
    let scope = form.scope;
    let record = tokio::task::spawn_blocking(move || {
        engine.issue_authorization_code(
            &client_id,
            &owner.subject,
            redirect_uri.as_deref(),
            scope.as_deref(),
        )
    })
    .await??;

    let target = record.redirect_uri.as_deref().unwrap_or_default();
    let mut redirect = Url::parse(target)
        .map_err(|e| AppError::BadRequest(format!("invalid redirect URI: {}", e)))?;
    {
        let mut query = redirect.query_pairs_mut();
        query.append_pair("code", &record.code);
        if let Some(state) = &form.state {
            query.append_pair("state", state);
        }
    }

    Ok(Json(AuthorizeResponse {
        code: record.code,
        redirect_uri: redirect.to_string(),
        state: form.state,
    }))
}
