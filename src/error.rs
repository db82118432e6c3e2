//! Error types.
//!
//! Only [`Error`] ever reaches the caller of the coordination API.  Every
//! [`ChannelError`] is absorbed by the component that produced it and is
//! only visible through the log and the optional diagnostic hook.

use std::io;

/// Errors that propagate out of the coordination API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The application identifier was empty or whitespace-only.
    #[error("invalid application identifier: must not be empty or whitespace")]
    InvalidIdentifier,

    /// The process-wide context was already set up under another identifier.
    #[error("application identifier already set to {current:?}, got {requested:?}")]
    IdentifierChanged { current: String, requested: String },
}

/// Errors from acquiring the named exclusive lock.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    #[error("failed to create lock file {path}: {source}")]
    LockFileCreation {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to acquire lock: {0}")]
    LockAcquisition(#[source] io::Error),
}

/// Transport failures on either side of the local message channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no listener reachable within {0} ms")]
    ConnectTimeout(u64),
    #[error("message exceeds {0} bytes")]
    MessageTooLarge(usize),
    #[error("args handler panicked: {0}")]
    HandlerPanicked(String),
}
