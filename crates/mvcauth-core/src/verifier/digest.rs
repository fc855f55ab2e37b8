//! HTTP Digest verification (RFC 2617, MD5, `qop=auth`).
//!
//! Nonces are self-describing so that no server-side nonce table is needed:
//!
//! ```text
//! nonce = hex16(issued_at_unix_secs) || md5_hex(issued_at ":" realm ":" secret)
//! ```
//!
//! A nonce is fresh while `now - issued_at <= nonce_timeout`.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use subtle::ConstantTimeEq;

use super::{
    precheck, quote, AuthRequest, CredentialVerifier, Credentials, DigestCredentials,
    FailureReason, Verdict,
};
use crate::backend::DigestFileBackend;
use crate::clock::Clock;
use crate::error::BackendResult;
use crate::identity::{AuthScheme, Identity};

const TIMESTAMP_LEN: usize = 16;
const NONCE_LEN: usize = TIMESTAMP_LEN + 32;

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Issues and checks time-bounded digest nonces.
///
/// Nonces are stateless: nothing records which nonces or `nc` counts have
/// been used. A captured `Authorization: Digest` header therefore replays
/// successfully against the same method and URI until its nonce turns
/// stale, so `nonce_timeout` bounds the replay window. Deployments that
/// need single-use nonces must keep the timeout short or run Digest over
/// TLS only.
pub struct NonceManager {
    realm: String,
    secret: String,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl NonceManager {
    /// Create a manager with a random per-process secret.
    pub fn new(realm: impl Into<String>, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(realm, timeout, clock, hex::encode(secret))
    }

    /// Create a manager with a shared secret, so that several servers accept
    /// each other's nonces.
    pub fn with_secret(
        realm: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            secret: secret.into(),
            timeout,
            clock,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a nonce stamped with the current time.
    pub fn issue(&self) -> String {
        let issued_at = self.clock.now().timestamp().max(0) as u64;
        format!("{:016x}{}", issued_at, self.signature(issued_at))
    }

    /// Check that `nonce` was issued here and is still fresh.
    pub fn check(&self, nonce: &str) -> Result<(), FailureReason> {
        if nonce.len() != NONCE_LEN || !nonce.is_ascii() {
            return Err(FailureReason::InvalidNonce);
        }
        let (stamp, signature) = nonce.split_at(TIMESTAMP_LEN);
        let issued_at = u64::from_str_radix(stamp, 16).map_err(|_| FailureReason::InvalidNonce)?;

        if !ct_eq(&self.signature(issued_at), &signature.to_ascii_lowercase()) {
            return Err(FailureReason::InvalidNonce);
        }

        let age = self.clock.now().timestamp() - issued_at as i64;
        if age < 0 {
            return Err(FailureReason::InvalidNonce);
        }
        if age as u64 > self.timeout.as_secs() {
            return Err(FailureReason::StaleNonce);
        }
        Ok(())
    }

    fn signature(&self, issued_at: u64) -> String {
        md5_hex(&format!("{}:{}:{}", issued_at, self.realm, self.secret))
    }
}

/// Expected `response` value for digest credentials.
///
/// `HA2 = md5(method ":" uri)`; with `qop` the response is
/// `md5(HA1 ":" nonce ":" nc ":" cnonce ":" qop ":" HA2)`, without it
/// `md5(HA1 ":" nonce ":" HA2)`.
pub fn compute_response(ha1: &str, method: &str, credentials: &DigestCredentials) -> String {
    let ha2 = md5_hex(&format!("{}:{}", method, credentials.uri));
    match (&credentials.qop, &credentials.nc, &credentials.cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, credentials.nonce, nc, cnonce, qop, ha2
        )),
        _ => md5_hex(&format!("{}:{}:{}", ha1, credentials.nonce, ha2)),
    }
}

/// Verifies Digest credentials against a [`DigestFileBackend`].
pub struct DigestVerifier {
    backend: Arc<dyn DigestFileBackend>,
    realm: String,
    domains: Vec<String>,
    opaque: String,
    nonces: NonceManager,
}

impl DigestVerifier {
    pub fn new(
        backend: Arc<dyn DigestFileBackend>,
        realm: impl Into<String>,
        domains: Vec<String>,
        nonces: NonceManager,
    ) -> Self {
        let realm = realm.into();
        Self {
            backend,
            opaque: md5_hex(&realm),
            realm,
            domains,
            nonces,
        }
    }

    /// Nonce issuer shared with challenge generation.
    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    fn check(&self, digest: &DigestCredentials, request: &AuthRequest) -> BackendResult<Verdict> {
        let reject = |reason| Ok(Verdict::Rejected(reason));

        if let Some(algorithm) = &digest.algorithm {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return reject(FailureReason::Unsupported(format!("algorithm {}", algorithm)));
            }
        }
        if let Some(qop) = &digest.qop {
            if qop != "auth" {
                return reject(FailureReason::Unsupported(format!("qop {}", qop)));
            }
        }
        if digest.realm != self.realm {
            return reject(FailureReason::RealmMismatch);
        }
        if digest.uri != request.uri {
            return reject(FailureReason::UriMismatch);
        }
        if let Some(opaque) = &digest.opaque {
            if opaque != &self.opaque {
                return reject(FailureReason::OpaqueMismatch);
            }
        }
        if let Err(reason) = self.nonces.check(&digest.nonce) {
            return reject(reason);
        }

        let Some(ha1) = self.backend.lookup(&digest.username, &self.realm)? else {
            return reject(FailureReason::InvalidCredentials);
        };
        let expected = compute_response(&ha1, &request.method, digest);
        if !ct_eq(&expected, &digest.response.to_ascii_lowercase()) {
            return reject(FailureReason::InvalidCredentials);
        }

        Ok(Verdict::Accepted(Identity::http(
            digest.username.clone(),
            AuthScheme::Digest,
        )))
    }
}

impl CredentialVerifier for DigestVerifier {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Digest
    }

    fn verify(&self, credentials: &Credentials, request: &AuthRequest) -> BackendResult<Verdict> {
        if let Some(verdict) = precheck(credentials, AuthScheme::Digest) {
            return Ok(verdict);
        }
        let Credentials::Digest(digest) = credentials else {
            return Ok(Verdict::Rejected(FailureReason::InvalidCredentials));
        };

        let verdict = self.check(digest, request)?;
        if let Verdict::Rejected(reason) = &verdict {
            tracing::warn!(
                username = %digest.username,
                reason = %reason,
                "digest authentication rejected"
            );
        }
        Ok(verdict)
    }

    fn challenge(&self, failure: Option<&FailureReason>) -> String {
        let mut challenge = format!(
            "Digest realm={}, domain={}, nonce={}, opaque={}, algorithm=MD5, qop=\"auth\"",
            quote(&self.realm),
            quote(&self.domains.join(" ")),
            quote(&self.nonces.issue()),
            quote(&self.opaque),
        );
        if matches!(failure, Some(FailureReason::StaleNonce)) {
            challenge.push_str(", stale=true");
        }
        challenge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{digest_ha1, HtdigestFile};
    use crate::clock::ManualClock;
    use chrono::Utc;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn setup() -> (DigestVerifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let file = HtdigestFile::parse(&format!(
            "alice:api:{}\n",
            digest_ha1("alice", "api", "wonderland")
        ))
        .unwrap();
        let nonces = NonceManager::new("api", TIMEOUT, clock.clone());
        let verifier = DigestVerifier::new(Arc::new(file), "api", vec!["/".to_string()], nonces);
        (verifier, clock)
    }

    fn credentials(verifier: &DigestVerifier, password: &str, uri: &str) -> Credentials {
        let mut digest = DigestCredentials {
            username: "alice".to_string(),
            realm: "api".to_string(),
            nonce: verifier.nonces().issue(),
            uri: uri.to_string(),
            response: String::new(),
            qop: Some("auth".to_string()),
            nc: Some("00000001".to_string()),
            cnonce: Some("0a4f113b".to_string()),
            opaque: Some(verifier.opaque().to_string()),
            algorithm: Some("MD5".to_string()),
        };
        digest.response = compute_response(&digest_ha1("alice", "api", password), "GET", &digest);
        Credentials::Digest(digest)
    }

    #[test]
    fn test_rfc2617_response() {
        let digest = DigestCredentials {
            username: "Mufasa".to_string(),
            realm: "testrealm@host.com".to_string(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string(),
            uri: "/dir/index.html".to_string(),
            response: String::new(),
            qop: Some("auth".to_string()),
            nc: Some("00000001".to_string()),
            cnonce: Some("0a4f113b".to_string()),
            opaque: None,
            algorithm: None,
        };
        let ha1 = digest_ha1("Mufasa", "testrealm@host.com", "Circle Of Life");
        assert_eq!(
            compute_response(&ha1, "GET", &digest),
            "6629fae49393a05397450978507c4ef1"
        );
    }

    #[test]
    fn test_valid_response() {
        let (verifier, _clock) = setup();
        let request = AuthRequest::new("GET", "/resource");
        let creds = credentials(&verifier, "wonderland", "/resource");

        assert_eq!(
            verifier.verify(&creds, &request).unwrap(),
            Verdict::Accepted(Identity::http("alice", AuthScheme::Digest))
        );
    }

    #[test]
    fn test_wrong_password() {
        let (verifier, _clock) = setup();
        let request = AuthRequest::new("GET", "/resource");
        let creds = credentials(&verifier, "looking-glass", "/resource");

        assert_eq!(
            verifier.verify(&creds, &request).unwrap(),
            Verdict::Rejected(FailureReason::InvalidCredentials)
        );
    }

    #[test]
    fn test_stale_nonce_rejected_with_correct_password() {
        let (verifier, clock) = setup();
        let request = AuthRequest::new("GET", "/resource");
        let creds = credentials(&verifier, "wonderland", "/resource");

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(
            verifier.verify(&creds, &request).unwrap(),
            Verdict::Rejected(FailureReason::StaleNonce)
        );
        assert!(verifier
            .challenge(Some(&FailureReason::StaleNonce))
            .ends_with("stale=true"));
    }

    #[test]
    fn test_nonce_at_timeout_boundary_is_fresh() {
        let (verifier, clock) = setup();
        let nonce = verifier.nonces().issue();
        clock.advance(chrono::Duration::seconds(60));
        assert!(verifier.nonces().check(&nonce).is_ok());
    }

    #[test]
    fn test_replay_bounded_by_nonce_timeout() {
        let (verifier, clock) = setup();
        let request = AuthRequest::new("GET", "/resource");
        let creds = credentials(&verifier, "wonderland", "/resource");

        assert!(matches!(verifier.verify(&creds, &request).unwrap(), Verdict::Accepted(_)));
        clock.advance(chrono::Duration::seconds(30));
        assert!(matches!(verifier.verify(&creds, &request).unwrap(), Verdict::Accepted(_)));

        clock.advance(chrono::Duration::seconds(31));
        assert_eq!(
            verifier.verify(&creds, &request).unwrap(),
            Verdict::Rejected(FailureReason::StaleNonce)
        );
    }

    #[test]
    fn test_tampered_nonce() {
        let (verifier, _clock) = setup();
        let nonce = verifier.nonces().issue();
        let forged = format!("{:016x}{}", 4_000_000_000u64, &nonce[TIMESTAMP_LEN..]);

        assert_eq!(verifier.nonces().check(&forged), Err(FailureReason::InvalidNonce));
        assert_eq!(verifier.nonces().check("short"), Err(FailureReason::InvalidNonce));
    }

    #[test]
    fn test_foreign_nonce_secret() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let ours = NonceManager::with_secret("api", TIMEOUT, clock.clone(), "one");
        let theirs = NonceManager::with_secret("api", TIMEOUT, clock, "two");

        assert!(ours.check(&ours.issue()).is_ok());
        assert_eq!(ours.check(&theirs.issue()), Err(FailureReason::InvalidNonce));
    }

    #[test]
    fn test_uri_and_realm_mismatch() {
        let (verifier, _clock) = setup();
        let request = AuthRequest::new("GET", "/other");
        let creds = credentials(&verifier, "wonderland", "/resource");
        assert_eq!(
            verifier.verify(&creds, &request).unwrap(),
            Verdict::Rejected(FailureReason::UriMismatch)
        );

        let Credentials::Digest(mut digest) = credentials(&verifier, "wonderland", "/other") else {
            unreachable!();
        };
        digest.realm = "admin".to_string();
        assert_eq!(
            verifier
                .verify(&Credentials::Digest(digest), &request)
                .unwrap(),
            Verdict::Rejected(FailureReason::RealmMismatch)
        );
    }

    #[test]
    fn test_challenge_format() {
        let (verifier, _clock) = setup();
        let challenge = verifier.challenge(None);

        assert!(challenge.starts_with("Digest realm=\"api\", domain=\"/\", nonce=\""));
        assert!(challenge.contains("qop=\"auth\""));
        assert!(!challenge.contains("stale"));
    }
}
