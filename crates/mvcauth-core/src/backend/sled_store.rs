//! OAuth2 store persisted with sled.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::OAuth2StoreBackend;
use crate::error::{BackendError, BackendResult};
use crate::oauth2::{AuthorizationCodeRecord, ClientRecord, TokenRecord};

const CLIENTS_TREE: &[u8] = b"oauth2:clients";
const TOKENS_TREE: &[u8] = b"oauth2:access_tokens";
const CODES_TREE: &[u8] = b"oauth2:authorization_codes";

/// OAuth2 store backed by three sled trees with JSON-encoded values.
pub struct SledOAuth2Store {
    _db: sled::Db,
    clients: sled::Tree,
    tokens: sled::Tree,
    codes: sled::Tree,
}

impl SledOAuth2Store {
    /// Open (or create) a sled database at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> BackendResult<Self> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Open the OAuth2 trees inside an existing database.
    pub fn open(db: &sled::Db) -> BackendResult<Self> {
        Ok(Self {
            _db: db.clone(),
            clients: db.open_tree(CLIENTS_TREE)?,
            tokens: db.open_tree(TOKENS_TREE)?,
            codes: db.open_tree(CODES_TREE)?,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> BackendResult<()> {
        self.clients.flush()?;
        self.tokens.flush()?;
        self.codes.flush()?;
        Ok(())
    }

    fn purge_tree<T: DeserializeOwned>(
        tree: &sled::Tree,
        expired: impl Fn(&T) -> bool,
    ) -> BackendResult<usize> {
        let mut removed = 0;
        for entry in tree.iter() {
            let (key, value) = entry?;
            if expired(&decode(&value)?) {
                tree.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> BackendResult<Option<T>> {
        tree.get(key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put<T: Serialize>(tree: &sled::Tree, key: &str, value: &T) -> BackendResult<()> {
        tree.insert(key.as_bytes(), encode(value)?)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> BackendResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| BackendError::Corrupt(format!("serialization error: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> BackendResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| BackendError::Corrupt(format!("deserialization error: {}", e)))
}

impl OAuth2StoreBackend for SledOAuth2Store {
    fn get_client(&self, client_id: &str) -> BackendResult<Option<ClientRecord>> {
        Self::get(&self.clients, client_id)
    }

    fn put_client(&self, client: &ClientRecord) -> BackendResult<()> {
        Self::put(&self.clients, &client.client_id, client)
    }

    fn get_access_token(&self, token: &str) -> BackendResult<Option<TokenRecord>> {
        Self::get(&self.tokens, token)
    }

    fn put_access_token(&self, token: &TokenRecord) -> BackendResult<()> {
        Self::put(&self.tokens, &token.access_token, token)
    }

    fn revoke_access_token(&self, token: &str) -> BackendResult<bool> {
        Ok(self.tokens.remove(token.as_bytes())?.is_some())
    }

    fn get_authorization_code(&self, code: &str) -> BackendResult<Option<AuthorizationCodeRecord>> {
        Self::get(&self.codes, code)
    }

    fn put_authorization_code(&self, code: &AuthorizationCodeRecord) -> BackendResult<()> {
        Self::put(&self.codes, &code.code, code)
    }

    fn consume_authorization_code(
        &self,
        code: &str,
    ) -> BackendResult<Option<AuthorizationCodeRecord>> {
        // sled's remove is a single atomic swap; only one caller sees the old value.
        self.codes
            .remove(code.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BackendResult<usize> {
        let tokens = Self::purge_tree(&self.tokens, |t: &TokenRecord| t.is_expired(now))?;
        let codes =
            Self::purge_tree(&self.codes, |c: &AuthorizationCodeRecord| c.is_expired(now))?;
        Ok(tokens + codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn test_store() -> (SledOAuth2Store, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledOAuth2Store::open(&db).unwrap();
        (store, db)
    }

    fn token(value: &str, ttl: i64) -> TokenRecord {
        TokenRecord {
            access_token: value.to_string(),
            client_id: "svc".to_string(),
            user_id: None,
            expires_at: Utc::now() + Duration::seconds(ttl),
            scope: Some("read".to_string()),
        }
    }

    #[test]
    fn test_client_roundtrip() {
        let (store, _db) = test_store();
        let client = ClientRecord::new("svc")
            .with_secret("s3cret")
            .with_scope("read");

        store.put_client(&client).unwrap();
        let loaded = store.get_client("svc").unwrap().unwrap();
        assert_eq!(loaded, client);
        assert!(loaded.verify_secret("s3cret"));
    }

    #[test]
    fn test_revoke_token() {
        let (store, _db) = test_store();
        store.put_access_token(&token("tok", 60)).unwrap();

        assert!(store.get_access_token("tok").unwrap().is_some());
        assert!(store.revoke_access_token("tok").unwrap());
        assert!(store.get_access_token("tok").unwrap().is_none());
    }

    #[test]
    fn test_purge_expired() {
        let (store, _db) = test_store();
        store.put_access_token(&token("old", -10)).unwrap();
        store.put_access_token(&token("fresh", 60)).unwrap();
        store
            .put_authorization_code(&AuthorizationCodeRecord {
                code: "unused".to_string(),
                client_id: "web".to_string(),
                user_id: None,
                redirect_uri: None,
                expires_at: Utc::now() - Duration::seconds(1),
                scope: None,
            })
            .unwrap();

        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 2);
        assert!(store.get_access_token("fresh").unwrap().is_some());
        assert!(store.get_access_token("old").unwrap().is_none());
        assert!(store.get_authorization_code("unused").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record() {
        let (store, db) = test_store();
        db.open_tree(TOKENS_TREE)
            .unwrap()
            .insert("bad", b"not json".to_vec())
            .unwrap();

        let err = store.get_access_token("bad").unwrap_err();
        assert!(matches!(err, BackendError::Corrupt(_)));
    }

    #[test]
    fn test_concurrent_consume() {
        let (store, _db) = test_store();
        let store = Arc::new(store);
        store
            .put_authorization_code(&AuthorizationCodeRecord {
                code: "race".to_string(),
                client_id: "web".to_string(),
                user_id: None,
                redirect_uri: None,
                expires_at: Utc::now() + Duration::seconds(30),
                scope: None,
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.consume_authorization_code("race").unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }
}
