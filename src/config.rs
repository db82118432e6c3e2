//! Runtime configuration.
//!
//! Every field has a compiled-in default, so an empty `{}` file (or no file
//! at all) is valid.
//!
//! # Example
//!
//! ```json
//! {
//!   "runtime_dir": "/run/user/1000",
//!   "connect_timeout_ms": 1000,
//!   "read_timeout_ms": 2000,
//!   "max_message_bytes": 1048576
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the lock file and the socket.  When unset,
    /// `$XDG_RUNTIME_DIR` is used, falling back to a per-user directory
    /// under the system temp dir.
    pub runtime_dir: Option<PathBuf>,
    /// How long a secondary waits for the primary's endpoint (ms).  Set to
    /// `0` for a single connection attempt.
    pub connect_timeout_ms: u64,
    /// How long the primary waits for a connected client to finish
    /// writing its message (ms).  Set to `0` to disable the timeout; a
    /// client that connects and never writes then stalls the listener.
    pub read_timeout_ms: u64,
    /// Upper bound on a single encoded message.
    pub max_message_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_dir: None,
            connect_timeout_ms: 1000,
            read_timeout_ms: 2000,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Use `dir` for the lock file and socket instead of the default.
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    /// The directory endpoints are created in.
    pub fn resolved_runtime_dir(&self) -> PathBuf {
        if let Some(dir) = &self.runtime_dir {
            return dir.clone();
        }
        runtime_dir_from(std::env::var_os("XDG_RUNTIME_DIR"))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// `$XDG_RUNTIME_DIR` if set, else `<tmp>/instance-relay-<uid>` so users
/// sharing a temp dir never contend for each other's lock files.
fn runtime_dir_from(xdg_runtime_dir: Option<OsString>) -> PathBuf {
    match xdg_runtime_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            // SAFETY: getuid has no preconditions and cannot fail.
            let uid = unsafe { libc::getuid() };
            std::env::temp_dir().join(format!("instance-relay-{}", uid))
        }
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);
