//! Identity echo endpoint.

use axum::{routing::get, Json, Router};
use mvcauth_core::Identity;

use crate::auth::Authenticated;
use crate::AppState;

/// Routes that require the authentication middleware.
pub fn routes() -> Router<AppState> {
    Router::new().route("/whoami", get(whoami))
}

/// Return the identity the request was authenticated as.
async fn whoami(Authenticated(identity): Authenticated) -> Json<Identity> {
    Json(identity)
}
