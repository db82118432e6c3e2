//! The coordination entry point that ties election and the message
//! channel together.
//!
//! [`Coordinator`] is an explicit context object: it owns the election
//! lock, the cached [`Role`] and the listener for one application
//! identifier.  A host normally keeps exactly one for the life of the
//! process (the free functions at the bottom of this module do that for
//! you); tests build several to simulate independent processes.
//!
//! # Typical usage
//!
//! ```ignore
//! let coordinator = Coordinator::new("MyApp")?;
//! coordinator.on_args_received(|args: Vec<String>| open_files(args));
//! coordinator.launch_or_exit(true);
//! // Only the primary gets here.
//! ```

use crate::config::Config;
use crate::election::LeaderElection;
use crate::error::Error;
use crate::identifier::AppId;
use crate::ipc::client::ArgsClient;
use crate::ipc::listener::{ArgsListener, ListenerHandle};
use crate::ipc::Hooks;
use crate::traits::{ArgsHandler, DiagnosticSink};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Outcome of leader election for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// No election has run yet.
    #[default]
    Unknown,
    /// This process owns the identifier and its endpoint.
    Primary,
    /// Another live process owns the identifier.
    Secondary,
}

/// Election state, guarded together so the role is computed at most once.
struct Session {
    election: LeaderElection,
    role: Role,
}

/// Single-instance coordination context for one application identifier.
pub struct Coordinator {
    app_id: AppId,
    config: Config,
    socket_path: PathBuf,
    session: Mutex<Session>,
    /// Set on the first attempt to start listening; `None` if binding failed.
    listener: OnceLock<Option<ListenerHandle>>,
    hooks: Hooks,
}

impl Coordinator {
    /// Create a context with the default configuration.
    ///
    /// Fails with [`Error::InvalidIdentifier`] for an empty or whitespace-only
    /// identifier, before any file, lock or socket is touched.
    pub fn new(identifier: &str) -> Result<Self, Error> {
        Self::with_config(identifier, Config::default())
    }

    pub fn with_config(identifier: &str, config: Config) -> Result<Self, Error> {
        Ok(Self::from_parts(AppId::new(identifier)?, config, Hooks::default()))
    }

    fn from_parts(app_id: AppId, config: Config, hooks: Hooks) -> Self {
        let socket_path = app_id.socket_path(&config.resolved_runtime_dir());
        let election = LeaderElection::new(&app_id, &config);
        Self {
            app_id,
            config,
            socket_path,
            session: Mutex::new(Session {
                election,
                role: Role::Unknown,
            }),
            listener: OnceLock::new(),
            hooks,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// The cached role; [`Role::Unknown`] until an entry point has run.
    pub fn role(&self) -> Role {
        self.session().role
    }

    /// `true` while this context owns the election lock.  A [`Role::Primary`]
    /// without the lock means election failed with an I/O error and the
    /// process is running unguarded.
    pub fn holds_lock(&self) -> bool {
        self.session().election.holds_lock()
    }

    /// `true` once the primary's endpoint is bound and accepting.
    pub fn is_listening(&self) -> bool {
        matches!(self.listener.get(), Some(Some(handle)) if handle.is_running())
    }

    /// Register the handler invoked once per message the primary receives.
    /// Replaces any earlier handler.
    pub fn on_args_received(&self, handler: impl ArgsHandler) {
        self.hooks.set_args_handler(handler);
    }

    /// Observe transport errors that are otherwise only logged.
    pub fn on_diagnostic(&self, sink: impl DiagnosticSink) {
        self.hooks.set_diagnostic(sink);
    }

    /// Return `true` if this process is the primary, arming the listener.
    /// Otherwise forward this process's arguments (when `send_args`) and
    /// return `false`.  Never terminates the process.
    pub fn check_and_launch(&self, send_args: bool) -> bool {
        self.check_and_launch_with(send_args.then(command_line_args))
    }

    /// [`check_and_launch`](Self::check_and_launch) with an explicit
    /// argument list; `None` forwards nothing.
    pub fn check_and_launch_with(&self, forward: Option<Vec<String>>) -> bool {
        match self.elect() {
            Role::Primary => {
                self.start_listening();
                true
            }
            _ => {
                if let Some(args) = forward {
                    self.client().send(&args);
                }
                false
            }
        }
    }

    /// Return if this process is the primary (with the listener armed).
    /// Otherwise forward this process's arguments (when `send_args`) and
    /// exit the process with status 0.
    pub fn launch_or_exit(&self, send_args: bool) {
        self.launch_or_exit_with(send_args.then(command_line_args))
    }

    /// [`launch_or_exit`](Self::launch_or_exit) with an explicit argument
    /// list; `None` forwards nothing.
    pub fn launch_or_exit_with(&self, forward: Option<Vec<String>>) {
        if self.check_and_launch_with(forward) {
            return;
        }
        info!("{} is already running, exiting", self.app_id);
        std::process::exit(0);
    }

    /// Run the election once; later calls return the cached role.
    fn elect(&self) -> Role {
        let mut session = self.session();
        if session.role != Role::Unknown {
            return session.role;
        }

        let won = match session.election.try_acquire() {
            Ok(won) => won,
            Err(e) => {
                // Refusing to start at all would be worse than a second primary.
                warn!("leader election for {} failed, continuing as primary: {}", self.app_id, e);
                true
            }
        };
        session.role = if won { Role::Primary } else { Role::Secondary };
        info!("{} role: {:?}", self.app_id, session.role);
        session.role
    }

    /// Bind and spawn the listener the first time the primary asks for it.
    fn start_listening(&self) {
        self.listener.get_or_init(|| {
            let spawned = ArgsListener::bind(&self.socket_path, &self.config)
                .and_then(|listener| Ok(listener.spawn(self.hooks.clone())?));
            match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    self.hooks.report("could not start listener", e);
                    None
                }
            }
        });
    }

    fn client(&self) -> ArgsClient {
        ArgsClient::new(&self.socket_path, &self.config).with_hooks(self.hooks.clone())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// This process's arguments, without the program path.
fn command_line_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

//  Process-wide context

static PROCESS: OnceLock<Coordinator> = OnceLock::new();
static PROCESS_HOOKS: OnceLock<Hooks> = OnceLock::new();

fn process_hooks() -> &'static Hooks {
    PROCESS_HOOKS.get_or_init(Hooks::default)
}

/// Set up (or fetch) the process-wide [`Coordinator`].
///
/// The first successful call fixes the identifier and configuration for the
/// rest of the process.  A later call with a different identifier fails with
/// [`Error::IdentifierChanged`]; `config` is ignored after the first call.
pub fn init(identifier: &str, config: Config) -> Result<&'static Coordinator, Error> {
    let app_id = AppId::new(identifier)?;
    let coordinator = PROCESS
        .get_or_init(|| Coordinator::from_parts(app_id.clone(), config, process_hooks().clone()));
    if coordinator.app_id != app_id {
        error!(
            "{} requested, but this process is already coordinating as {}",
            app_id, coordinator.app_id
        );
        return Err(Error::IdentifierChanged {
            current: coordinator.app_id.to_string(),
            requested: app_id.to_string(),
        });
    }
    Ok(coordinator)
}

/// Process-wide [`Coordinator::launch_or_exit`].
///
/// Only returns (with `Ok`) in the primary; the lock is then held until the
/// process exits.
pub fn launch_or_exit(identifier: &str, send_args: bool) -> Result<&'static Coordinator, Error> {
    let coordinator = init(identifier, Config::default())?;
    coordinator.launch_or_exit(send_args);
    Ok(coordinator)
}

/// Process-wide [`Coordinator::check_and_launch`].
pub fn check_and_launch(identifier: &str, send_args: bool) -> Result<bool, Error> {
    Ok(init(identifier, Config::default())?.check_and_launch(send_args))
}

/// Register the process-wide arguments handler.  May be called before or
/// after [`init`].
pub fn on_args_received(handler: impl ArgsHandler) {
    process_hooks().set_args_handler(handler);
}

/// Register the process-wide diagnostic sink.  May be called before or
/// after [`init`].
pub fn on_diagnostic(sink: impl DiagnosticSink) {
    process_hooks().set_diagnostic(sink);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator_in(dir: &TempDir, id: &str) -> Coordinator {
        let config = Config {
            connect_timeout_ms: 500,
            ..Config::default()
        }
        .with_runtime_dir(dir.path());
        Coordinator::with_config(id, config).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_identifier_is_rejected_before_touching_anything() {
        let dir = TempDir::new().unwrap();
        for id in ["", "   ", "\t"] {
            let config = Config::default().with_runtime_dir(dir.path());
            assert!(matches!(
                Coordinator::with_config(id, config),
                Err(Error::InvalidIdentifier)
            ));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn process_entry_points_reject_blank_identifier() {
        assert!(matches!(launch_or_exit(" ", true), Err(Error::InvalidIdentifier)));
        assert!(matches!(check_and_launch("", true), Err(Error::InvalidIdentifier)));
    }

    #[test]
    fn role_is_unknown_until_first_call() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        assert_eq!(a.role(), Role::Unknown);
        assert!(!a.is_listening());
    }

    #[test]
    fn first_is_primary_second_is_secondary() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let b = coordinator_in(&dir, "App1");

        assert!(a.check_and_launch_with(None));
        assert!(!b.check_and_launch_with(None));
        assert_eq!(a.role(), Role::Primary);
        assert_eq!(b.role(), Role::Secondary);
        assert!(a.is_listening());
        assert!(a.holds_lock());
        assert!(!b.holds_lock());
    }

    #[test]
    fn secondary_never_binds_an_endpoint() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let b = coordinator_in(&dir, "App1");
        assert!(a.check_and_launch_with(None));
        assert!(!b.check_and_launch_with(None));
        assert!(!b.is_listening());
    }

    #[test]
    fn role_is_cached_across_calls() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let b = coordinator_in(&dir, "App1");

        assert!(a.check_and_launch_with(None));
        assert!(!b.check_and_launch_with(None));

        // Primary goes away; b keeps its original answer.
        drop(a);
        assert!(!b.check_and_launch_with(None));
        assert_eq!(b.role(), Role::Secondary);
    }

    #[test]
    fn repeated_primary_calls_keep_one_listener() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        assert!(a.check_and_launch_with(None));
        assert!(a.check_and_launch_with(None));
        a.launch_or_exit_with(None);
        assert!(a.is_listening());
    }

    #[test]
    fn secondary_forwards_arguments_to_primary() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let (tx, rx) = mpsc::channel();
        a.on_args_received(move |args: Vec<String>| {
            let _ = tx.send(args);
        });
        assert!(a.check_and_launch_with(None));

        let b = coordinator_in(&dir, "App1");
        assert!(!b.check_and_launch_with(Some(strings(&["--flag", "value"]))));
        let c = coordinator_in(&dir, "App1");
        assert!(!c.check_and_launch_with(Some(vec![])));

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), strings(&["--flag", "value"]));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn other_identifiers_are_independent() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let b = coordinator_in(&dir, "App2");
        assert!(a.check_and_launch_with(None));
        assert!(b.check_and_launch_with(None));
        assert_ne!(a.socket_path(), b.socket_path());
    }

    #[test]
    fn forwarding_to_vanished_primary_is_silent() {
        let dir = TempDir::new().unwrap();
        let a = coordinator_in(&dir, "App1");
        let b = coordinator_in(&dir, "App1");
        assert!(a.check_and_launch_with(None));
        // Lock stays held but the endpoint disappears.
        std::fs::remove_file(a.socket_path()).unwrap();

        let (tx, rx) = mpsc::channel();
        b.on_diagnostic(move |e: &ChannelError| {
            let _ = tx.send(matches!(e, ChannelError::ConnectTimeout(_)));
        });
        assert!(!b.check_and_launch_with(Some(strings(&["lost"]))));
        assert!(rx.try_recv().unwrap());
    }

    #[test]
    fn unusable_runtime_dir_falls_back_to_primary() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let config = Config::default().with_runtime_dir(&blocker);
        let a = Coordinator::with_config("App1", config).unwrap();

        let (tx, rx) = mpsc::channel();
        a.on_diagnostic(move |e: &ChannelError| {
            let _ = tx.send(e.to_string());
        });
        assert!(a.check_and_launch_with(None));
        assert_eq!(a.role(), Role::Primary);
        assert!(!a.holds_lock());
        assert!(!a.is_listening());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn process_context_keeps_its_identifier() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_runtime_dir(dir.path());
        let first = init("ProcessWide", config.clone()).unwrap();
        let again = init("ProcessWide", config.clone()).unwrap();
        assert!(std::ptr::eq(first, again));

        assert!(matches!(
            init("SomethingElse", config),
            Err(Error::IdentifierChanged { .. })
        ));
    }
}
