//! Process-local OAuth2 store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::OAuth2StoreBackend;
use crate::error::BackendResult;
use crate::oauth2::{AuthorizationCodeRecord, ClientRecord, TokenRecord};

/// In-memory OAuth2 store.
///
/// Each map sits behind its own lock; writers are serialised per map and
/// code consumption is a single `remove` under the write lock.
#[derive(Debug, Default)]
pub struct MemoryOAuth2Store {
    clients: RwLock<HashMap<String, ClientRecord>>,
    tokens: RwLock<HashMap<String, TokenRecord>>,
    codes: RwLock<HashMap<String, AuthorizationCodeRecord>>,
}

impl MemoryOAuth2Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored access tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }

    /// Number of stored authorization codes.
    pub fn code_count(&self) -> usize {
        self.codes.read().len()
    }
}

impl OAuth2StoreBackend for MemoryOAuth2Store {
    fn get_client(&self, client_id: &str) -> BackendResult<Option<ClientRecord>> {
        Ok(self.clients.read().get(client_id).cloned())
    }

    fn put_client(&self, client: &ClientRecord) -> BackendResult<()> {
        self.clients
            .write()
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    fn get_access_token(&self, token: &str) -> BackendResult<Option<TokenRecord>> {
        Ok(self.tokens.read().get(token).cloned())
    }

    fn put_access_token(&self, token: &TokenRecord) -> BackendResult<()> {
        self.tokens
            .write()
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    fn revoke_access_token(&self, token: &str) -> BackendResult<bool> {
        Ok(self.tokens.write().remove(token).is_some())
    }

    fn get_authorization_code(&self, code: &str) -> BackendResult<Option<AuthorizationCodeRecord>> {
        Ok(self.codes.read().get(code).cloned())
    }

    fn put_authorization_code(&self, code: &AuthorizationCodeRecord) -> BackendResult<()> {
        self.codes.write().insert(code.code.clone(), code.clone());
        Ok(())
    }

    fn consume_authorization_code(
        &self,
        code: &str,
    ) -> BackendResult<Option<AuthorizationCodeRecord>> {
        Ok(self.codes.write().remove(code))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BackendResult<usize> {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired(now));
        let mut removed = before - tokens.len();
        drop(tokens);

        let mut codes = self.codes.write();
        let before = codes.len();
        codes.retain(|_, code| !code.is_expired(now));
        removed += before - codes.len();
        Ok(removed)
    }
}
