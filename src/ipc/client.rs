//! Secondary-side sender.
//!
//! Fire-and-forget: connect to the primary's socket, write one message,
//! close.  [`ArgsClient::send`] never reports failure to its caller and never
//! re-sends; by the time a secondary gets here the primary was just seen
//! holding the lock, so a failure means it exited in between.

use super::{encode_args, Hooks};
use crate::config::Config;
use crate::error::ChannelError;
use log::debug;
use std::io::{self, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Pause between connection attempts while the endpoint is not armed yet.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Sends argument lists to whichever process owns the socket.
pub struct ArgsClient {
    path: PathBuf,
    connect_timeout: Duration,
    hooks: Hooks,
}

impl ArgsClient {
    pub fn new(path: impl AsRef<Path>, config: &Config) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            connect_timeout: config.connect_timeout(),
            hooks: Hooks::default(),
        }
    }

    /// Report absorbed failures through `hooks` instead of only logging them.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Best-effort delivery of `args`.  Failures are logged and reported to
    /// the diagnostic sink, never returned.
    pub fn send(&self, args: &[String]) {
        if let Err(e) = self.try_send(args) {
            self.hooks.report("could not forward arguments", e);
        }
    }

    /// Deliver `args`, returning the cause on failure.
    pub fn try_send(&self, args: &[String]) -> Result<(), ChannelError> {
        let payload = encode_args(args)?;
        let mut stream = self.connect()?;
        if !self.connect_timeout.is_zero() {
            stream.set_write_timeout(Some(self.connect_timeout))?;
        }
        stream.write_all(&payload)?;
        stream.shutdown(Shutdown::Write)?;
        debug!("forwarded {} argument(s) to {}", args.len(), self.path.display());
        Ok(())
    }

    /// Connect, waiting up to the connect timeout for the endpoint to appear.
    fn connect(&self) -> Result<UnixStream, ChannelError> {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match UnixStream::connect(&self.path) {
                Ok(stream) => return Ok(stream),
                Err(e) if is_not_listening(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ChannelError::ConnectTimeout(
                            self.connect_timeout.as_millis() as u64,
                        ));
                    }
                    thread::sleep(CONNECT_POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// No socket file, or a socket file nobody is accepting on.
fn is_not_listening(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::listener::ArgsListener;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn quick_config(timeout_ms: u64) -> Config {
        Config {
            connect_timeout_ms: timeout_ms,
            ..Config::default()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn send_reaches_listener() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sock");
        let hooks = Hooks::default();
        let (tx, rx) = mpsc::channel();
        hooks.set_args_handler(move |args: Vec<String>| {
            let _ = tx.send(args);
        });
        let _handle = ArgsListener::bind(&path, &Config::default())
            .unwrap()
            .spawn(hooks)
            .unwrap();

        let client = ArgsClient::new(&path, &Config::default());
        client.try_send(&strings(&["--flag", "value"])).unwrap();
        client.try_send(&[]).unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), strings(&["--flag", "value"]));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn missing_listener_times_out_within_bound() {
        let dir = TempDir::new().unwrap();
        let client = ArgsClient::new(dir.path().join("nobody.sock"), &quick_config(200));

        let started = Instant::now();
        let result = client.try_send(&strings(&["file.txt"]));
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(ChannelError::ConnectTimeout(200))));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn stale_socket_file_counts_as_no_listener() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let client = ArgsClient::new(&path, &quick_config(100));
        assert!(matches!(
            client.try_send(&[]),
            Err(ChannelError::ConnectTimeout(_))
        ));
    }

    #[test]
    fn send_swallows_failure_and_reports_it() {
        let dir = TempDir::new().unwrap();
        let hooks = Hooks::default();
        let (tx, rx) = mpsc::channel();
        hooks.set_diagnostic(move |e: &ChannelError| {
            let _ = tx.send(e.to_string());
        });

        let client =
            ArgsClient::new(dir.path().join("nobody.sock"), &quick_config(50)).with_hooks(hooks);
        client.send(&strings(&["ignored"]));

        assert!(rx.try_recv().unwrap().contains("no listener reachable"));
    }

    #[test]
    fn waits_for_listener_that_arms_late() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.sock");
        let hooks = Hooks::default();
        let (tx, rx) = mpsc::channel();
        hooks.set_args_handler(move |args: Vec<String>| {
            let _ = tx.send(args);
        });

        let bind_path = path.clone();
        let binder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            ArgsListener::bind(&bind_path, &Config::default())
                .unwrap()
                .spawn(hooks)
                .unwrap()
        });

        let client = ArgsClient::new(&path, &quick_config(2000));
        client.try_send(&strings(&["eventually"])).unwrap();
        let _handle = binder.join().unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            strings(&["eventually"])
        );
    }
}
