//! Apache htpasswd password file.
//!
//! # Format
//!
//! ```text
//! # comment
//! alice:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=
//! bob:$apr1$r31.....$HqJZimcKQFAMYayBlzkrA/
//! carol:plaintext-password
//! ```
//!
//! Supported hash formats are `{SHA}`, `$apr1$` and plain text. Other
//! formats (bcrypt, crypt(3)) never verify.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use super::PasswordFileBackend;
use crate::error::{BackendError, BackendResult};

const SHA_PREFIX: &str = "{SHA}";
const APR1_MAGIC: &str = "$apr1$";
const ITOA64: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// In-memory view of an htpasswd file.
#[derive(Debug, Clone)]
pub struct HtpasswdFile {
    path: Option<PathBuf>,
    entries: HashMap<String, String>,
}

impl HtpasswdFile {
    /// Read and parse the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&contents)?;
        file.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), users = file.len(), "htpasswd file loaded");
        Ok(file)
    }

    /// Parse htpasswd contents.
    pub fn parse(contents: &str) -> BackendResult<Self> {
        let mut entries = HashMap::new();

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (user, hash) = line.split_once(':').ok_or_else(|| {
                BackendError::Corrupt(format!("htpasswd line {}: expected user:hash", lineno + 1))
            })?;
            if user.is_empty() {
                return Err(BackendError::Corrupt(format!(
                    "htpasswd line {}: empty user name",
                    lineno + 1
                )));
            }
            entries.insert(user.to_string(), hash.to_string());
        }

        Ok(Self {
            path: None,
            entries,
        })
    }

    /// Source path, if loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PasswordFileBackend for HtpasswdFile {
    fn lookup(&self, username: &str) -> BackendResult<Option<String>> {
        Ok(self.entries.get(username).cloned())
    }
}

/// Check `password` against an htpasswd hash.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Some(encoded) = hash.strip_prefix(SHA_PREFIX) {
        return ct_eq(sha1_base64(password).as_bytes(), encoded.as_bytes());
    }

    if let Some(rest) = hash.strip_prefix(APR1_MAGIC) {
        let Some((salt, _)) = rest.split_once('$') else {
            return false;
        };
        return ct_eq(apr1_crypt(password, salt).as_bytes(), hash.as_bytes());
    }

    if hash.starts_with("$2") || (hash.starts_with('$') && hash.len() > 3) {
        tracing::warn!("unsupported htpasswd hash format, entry cannot be verified");
        return false;
    }

    ct_eq(hash.as_bytes(), password.as_bytes())
}

/// `{SHA}` hash as written by `htpasswd -s`.
pub fn sha1_hash(password: &str) -> String {
    format!("{}{}", SHA_PREFIX, sha1_base64(password))
}

fn sha1_base64(password: &str) -> String {
    STANDARD.encode(Sha1::digest(password.as_bytes()))
}

/// Apache MD5-crypt (`$apr1$salt$hash`), as written by `htpasswd -m`.
///
/// The salt is truncated to 8 characters.
pub fn apr1_crypt(password: &str, salt: &str) -> String {
    let pw = password.as_bytes();
    let salt = &salt.as_bytes()[..salt.len().min(8)];

    let mut alt = md5::Context::new();
    alt.consume(pw);
    alt.consume(salt);
    alt.consume(pw);
    let alt = alt.compute().0;

    let mut ctx = md5::Context::new();
    ctx.consume(pw);
    ctx.consume(APR1_MAGIC.as_bytes());
    ctx.consume(salt);

    let mut remaining = pw.len();
    while remaining > 0 {
        let n = remaining.min(16);
        ctx.consume(&alt[..n]);
        remaining -= n;
    }

    let mut i = pw.len();
    while i > 0 {
        if i & 1 == 1 {
            ctx.consume([0u8]);
        } else {
            ctx.consume(&pw[..1]);
        }
        i >>= 1;
    }

    let mut digest = ctx.compute().0;

    for round in 0..1000 {
        let mut ctx = md5::Context::new();
        if round & 1 == 1 {
            ctx.consume(pw);
        } else {
            ctx.consume(digest);
        }
        if round % 3 != 0 {
            ctx.consume(salt);
        }
        if round % 7 != 0 {
            ctx.consume(pw);
        }
        if round & 1 == 1 {
            ctx.consume(digest);
        } else {
            ctx.consume(pw);
        }
        digest = ctx.compute().0;
    }

    let mut out = String::with_capacity(APR1_MAGIC.len() + salt.len() + 23);
    out.push_str(APR1_MAGIC);
    out.push_str(&String::from_utf8_lossy(salt));
    out.push('$');

    for (a, b, c) in [(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        let v = (u32::from(digest[a]) << 16) | (u32::from(digest[b]) << 8) | u32::from(digest[c]);
        to64(&mut out, v, 4);
    }
    to64(&mut out, u32::from(digest[11]), 2);

    out
}

fn to64(out: &mut String, mut v: u32, n: usize) {
    for _ in 0..n {
        out.push(ITOA64[(v & 0x3f) as usize] as char);
        v >>= 6;
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}
