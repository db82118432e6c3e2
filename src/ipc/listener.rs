//! Primary-side endpoint.
//!
//! Binds a Unix stream socket and accepts one connection at a time.  Each
//! connection carries exactly one message (see [`crate::ipc`]), which is
//! decoded and handed to the registered [`ArgsHandler`](crate::traits::ArgsHandler).
//!
//! Nothing that happens while serving a connection can stop the loop: a
//! bad payload, a slow client or a panicking handler costs that one
//! message, and the next `accept` is armed immediately.

use super::{decode_args, Hooks};
use crate::config::Config;
use crate::error::ChannelError;
use log::{debug, info};
use std::io::{self, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A bound, not yet running, argument listener.
pub struct ArgsListener {
    path: PathBuf,
    listener: UnixListener,
    read_timeout: Duration,
    max_message_bytes: usize,
}

/// Handle to a listener running on its own thread.
///
/// There is no stop operation; the thread lives until the process exits.
pub struct ListenerHandle {
    thread: JoinHandle<()>,
}

impl ArgsListener {
    /// Bind the socket at `path`.
    ///
    /// Any file already at `path` is removed first.  Only the process that
    /// holds the election lock calls this, so whatever is there belongs to a
    /// previous primary that has since exited.
    pub fn bind(path: impl AsRef<Path>, config: &Config) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&path)?;
        info!("listening on {}", path.display());

        Ok(Self {
            path,
            listener,
            read_timeout: config.read_timeout(),
            max_message_bytes: config.max_message_bytes,
        })
    }

    /// The filesystem path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the accept loop on a dedicated thread.
    pub fn spawn(self, hooks: Hooks) -> io::Result<ListenerHandle> {
        let thread = thread::Builder::new()
            .name("instance-relay-listener".into())
            .spawn(move || self.run(&hooks))?;
        Ok(ListenerHandle { thread })
    }

    /// Accept connections forever.
    ///
    /// This method **blocks** indefinitely.  Run it on a dedicated thread.
    pub fn run(&self, hooks: &Hooks) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    debug!("client connected");
                    if let Err(e) = self.serve(stream, hooks) {
                        hooks.report("dropped forwarded arguments", e);
                    }
                    debug!("client disconnected");
                }
                Err(e) => hooks.report("accept error", e.into()),
            }
        }
    }

    /// Read, decode and dispatch a single connection's message.
    fn serve(&self, mut stream: UnixStream, hooks: &Hooks) -> Result<(), ChannelError> {
        // Zero means no timeout.
        if !self.read_timeout.is_zero() {
            stream.set_read_timeout(Some(self.read_timeout))?;
        }

        let bytes = read_message(&mut stream, self.max_message_bytes)?;
        let args = decode_args(&bytes)?;
        debug!("received {:?}", args);

        if !hooks.dispatch(args)? {
            debug!("no args handler registered, message dropped");
        }
        Ok(())
    }
}

impl ListenerHandle {
    /// `false` only if the listener thread died, which the accept loop
    /// is written never to do.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }
}

/// Read until EOF, refusing anything larger than `limit` bytes.
fn read_message(stream: &mut impl Read, limit: usize) -> Result<Vec<u8>, ChannelError> {
    let mut bytes = Vec::new();
    // One byte past the limit tells "exactly full" from "too large".
    stream
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(ChannelError::MessageTooLarge(limit));
    }
    Ok(bytes)
}

//  Tests
