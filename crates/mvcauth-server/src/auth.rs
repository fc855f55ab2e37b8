//! Request authentication middleware.
//!
//! [`authenticate`] runs the listener on every request of the routes it is
//! layered on and stores the [`AuthResult`] in the request extensions.
//! Rejected credentials are answered with 401 right away; requests without
//! credentials pass through, and handlers that need an identity take the
//! [`Authenticated`] extractor.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use mvcauth_core::{AuthRequest, AuthResult, Identity};
use serde::Deserialize;

use crate::error::AppError;
use crate::AppState;

/// Largest form body buffered to look for an `access_token` parameter.
const MAX_FORM_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
struct AccessTokenParam {
    #[serde(default)]
    access_token: Option<String>,
}

/// Authenticate the request and record the outcome.
pub async fn authenticate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut request, auth_request) = auth_request(request).await?;

    let listener = state.listener.clone();
    let result = tokio::task::spawn_blocking(move || listener.authenticate(&auth_request)).await??;

    if let AuthResult::Failed(failure) = &result {
        return Err(AppError::Unauthorized {
            challenges: state.listener.challenges(&result),
            message: failure.reason.to_string(),
        });
    }

    request.extensions_mut().insert(result);
    Ok(next.run(request).await)
}

/// Build the transport-independent view of `request`.
///
/// Form bodies are buffered and put back so that handlers can still read
/// them.
async fn auth_request(request: Request) -> Result<(Request, AuthRequest), AppError> {
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut auth = AuthRequest::new(request.method().as_str(), uri);

    if let Some(value) = request.headers().get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::BadRequest("Authorization header is not valid ASCII".into()))?;
        auth.authorization = Some(value.to_string());
    }

    auth.access_token = Query::<AccessTokenParam>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(param)| param.access_token);

    if auth.access_token.is_some() || !is_form(&request) {
        return Ok((request, auth));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read request body: {}", e)))?;
    auth.access_token = serde_urlencoded::from_bytes::<AccessTokenParam>(&bytes)
        .ok()
        .and_then(|param| param.access_token);

    Ok((Request::from_parts(parts, Body::from(bytes)), auth))
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Extractor for handlers that require an authenticated caller.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthResult>() {
            Some(AuthResult::Authenticated(identity)) => Ok(Self(identity.clone())),
            _ => Err(AppError::Unauthorized {
                challenges: state.listener.challenges(&AuthResult::Unauthenticated),
                message: "authentication required".to_string(),
            }),
        }
    }
}
