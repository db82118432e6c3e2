//! File-lock based leader election.
//!
//! The first process to take an exclusive `flock` on the identifier's lock
//! file is the primary.  The lock is never released explicitly: the OS drops
//! it when the owning process exits, crash included, so a dead primary
//! never blocks the next launch.

use crate::config::Config;
use crate::error::ElectionError;
use crate::identifier::AppId;
use fs2::FileExt;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Leader election for one application identifier.
///
/// `flock` locks belong to the open file description, so two
/// `LeaderElection`s inside the same process contend exactly like two
/// separate processes would.
pub struct LeaderElection {
    lock_path: PathBuf,
    /// Held for as long as this value lives once the lock is won.
    lock_file: Option<File>,
    outcome: Option<bool>,
}

impl LeaderElection {
    pub fn new(app_id: &AppId, config: &Config) -> Self {
        Self {
            lock_path: app_id.lock_path(&config.resolved_runtime_dir()),
            lock_file: None,
            outcome: None,
        }
    }

    /// Try to become the sole owner of the identifier.
    ///
    /// Returns `Ok(true)` when this call won the lock, `Ok(false)` when it is
    /// held elsewhere.  Only the first call touches the file system; later
    /// calls return the cached outcome.
    pub fn try_acquire(&mut self) -> Result<bool, ElectionError> {
        if let Some(won) = self.outcome {
            return Ok(won);
        }

        if let Some(parent) = self.lock_path.parent() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)
                .map_err(|e| self.creation_error(e))?;
        }

        // No truncate: the file may be locked by someone else right now.
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.creation_error(e))?;

        let won = match file.try_lock_exclusive() {
            Ok(()) => {
                info!("acquired lock {}", self.lock_path.display());
                self.lock_file = Some(file);
                true
            }
            Err(e) if is_contended(&e) => {
                debug!("lock {} held by another process", self.lock_path.display());
                false
            }
            Err(e) => return Err(ElectionError::LockAcquisition(e)),
        };

        self.outcome = Some(won);
        Ok(won)
    }

    /// The cached outcome, if an election already ran.
    pub fn outcome(&self) -> Option<bool> {
        self.outcome
    }

    /// `true` only while this value owns the lock.
    pub fn holds_lock(&self) -> bool {
        self.lock_file.is_some()
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn creation_error(&self, source: io::Error) -> ElectionError {
        ElectionError::LockFileCreation {
            path: self.lock_path.display().to_string(),
            source,
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
