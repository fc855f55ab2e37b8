//! MVC Auth Server - HTTP front for the authentication listener.
//!
//! This crate runs the [`AuthenticationListener`] in front of HTTP routes and
//! exposes the OAuth2 token, revocation and authorization endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use config::{Args, ServerConfig};
pub use error::AppError;

use std::sync::Arc;

use axum::{middleware, Router};
use mvcauth_core::{AuthenticationListener, ConfigResult, ListenerFactory};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Per-request authentication dispatcher.
    pub listener: Arc<AuthenticationListener>,
    /// Server configuration.
    pub config: ServerConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(listener: AuthenticationListener, config: ServerConfig) -> Self {
        Self {
            listener: Arc::new(listener),
            config,
        }
    }

    /// Build the listener from the configuration tree in `config`.
    pub fn from_config(config: ServerConfig) -> ConfigResult<Self> {
        let listener = ListenerFactory::from_config(&config.auth)?;
        Ok(Self::new(listener, config))
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .merge(routes::whoami::routes())
        .merge(routes::oauth::authorize_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::oauth::routes())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
