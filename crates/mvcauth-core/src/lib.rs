//! MVC Auth Core - Authentication dispatch for HTTP APIs.
//!
//! This crate resolves an authentication configuration tree into a policy,
//! builds HTTP Basic, HTTP Digest and OAuth2 bearer verifiers from it, and
//! authenticates requests through an [`AuthenticationListener`]. It also
//! provides the OAuth2 grant engine (`client_credentials` and
//! `authorization_code`) and the file and token-store backends.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod identity;
pub mod listener;
pub mod oauth2;
pub mod policy;
pub mod registry;
pub mod verifier;

pub use backend::{
    open_store, DigestFileBackend, HtdigestFile, HtpasswdFile, MemoryOAuth2Store,
    OAuth2StoreBackend, PasswordFileBackend, SledOAuth2Store,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfigResolver;
pub use error::{
    BackendError, BackendResult, ConfigError, ConfigResult, GrantError, GrantErrorKind,
    GrantResult,
};
pub use factory::ListenerFactory;
pub use identity::{AuthScheme, Identity};
pub use listener::{AuthFailure, AuthResult, AuthState, AuthenticationListener};
pub use policy::{AuthPolicy, HttpScheme, OAuth2Policy, StoreConfig};
pub use registry::{CredentialVerifierRegistry, VerifierBackends};
pub use verifier::{AuthRequest, CredentialVerifier, Credentials, FailureReason, Verdict};

// OAuth2 exports
pub use oauth2::{
    AuthorizationCodeRecord, ClientRecord, GrantEngine, GrantRequest, GrantType, TokenRecord,
    TokenResponse,
};
