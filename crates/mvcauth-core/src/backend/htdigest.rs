//! Apache htdigest password file.
//!
//! Each line is `user:realm:HA1`, where `HA1 = md5(user ":" realm ":" password)`
//! in lowercase hex.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::DigestFileBackend;
use crate::error::{BackendError, BackendResult};

/// In-memory view of an htdigest file.
#[derive(Debug, Clone)]
pub struct HtdigestFile {
    path: Option<PathBuf>,
    entries: HashMap<(String, String), String>,
}

impl HtdigestFile {
    /// Read and parse the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&contents)?;
        file.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), users = file.len(), "htdigest file loaded");
        Ok(file)
    }

    /// Parse htdigest contents.
    pub fn parse(contents: &str) -> BackendResult<Self> {
        let mut entries = HashMap::new();

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(user), Some(realm), Some(ha1)) if !user.is_empty() && ha1.len() == 32 => {
                    entries.insert(
                        (user.to_string(), realm.to_string()),
                        ha1.to_ascii_lowercase(),
                    );
                }
                _ => {
                    return Err(BackendError::Corrupt(format!(
                        "htdigest line {}: expected user:realm:md5",
                        lineno + 1
                    )))
                }
            }
        }

        Ok(Self {
            path: None,
            entries,
        })
    }

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

impl DigestFileBackend for HtdigestFile {
    fn lookup(&self, username: &str, realm: &str) -> BackendResult<Option<String>> {
        Ok(self
            .entries
            .get(&(username.to_string(), realm.to_string()))
            .cloned())
    }
}

/// `HA1` for a user, as stored in htdigest files.
pub fn digest_ha1(username: &str, realm: &str, password: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}:{}", username, realm, password)))
}
