//! The application identifier and the endpoint names derived from it.
//!
//! Both the lock file and the socket are named after the identifier, so
//! processes that use the same identifier find each other and processes
//! that don't, never do.

use crate::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Longest sanitized prefix kept in endpoint names.
const MAX_STEM_PREFIX: usize = 32;

/// A validated, non-blank application identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(String);

impl AppId {
    /// Validate `id`.  Fails with [`Error::InvalidIdentifier`] for empty or
    /// whitespace-only input.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidIdentifier);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe stem shared by the lock file and the socket.
    ///
    /// Readable prefix plus a short digest of the raw identifier, so two
    /// identifiers that sanitize to the same prefix still get distinct names.
    pub fn endpoint_stem(&self) -> String {
        let prefix: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_STEM_PREFIX)
            .collect();
        let digest = md5::compute(self.0.as_bytes());
        format!("{}-{}", prefix, &format!("{:x}", digest)[..12])
    }

    pub fn lock_path(&self, runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(format!("{}.lock", self.endpoint_stem()))
    }

    pub fn socket_path(&self, runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(format!("{}.sock", self.endpoint_stem()))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
