//! HTTP route handlers.

pub mod health;
pub mod oauth;
pub mod whoami;
