//! **instance-relay** — single-instance coordination for desktop and CLI
//! applications.
//!
//! Every launch of an application calls one entry point with a shared
//! identifier.  The first launch wins a host-wide exclusive lock and becomes
//! the *primary*; it keeps running and listens on a local socket.  Every
//! later launch notices the lock is taken, forwards its command-line
//! arguments to the primary, and (in launch-or-exit mode) exits.
//!
//! # Architecture
//!
//! * [`election`] — `flock`-based leader election.  The OS releases the lock
//!   when the primary exits for any reason, so a crash never blocks future
//!   launches.
//! * [`ipc`] — the Unix-socket message channel: [`ipc::listener`] on the
//!   primary, [`ipc::client`] on secondaries.
//! * [`coordinator`] — the [`Coordinator`] context object plus process-wide
//!   convenience functions.
//! * [`traits`] — the [`ArgsHandler`](traits::ArgsHandler) and
//!   [`DiagnosticSink`](traits::DiagnosticSink) callback seams.
//!
//! # Example
//!
//! ```no_run
//! instance_relay::on_args_received(|args: Vec<String>| {
//!     println!("another launch asked for {:?}", args);
//! });
//! instance_relay::launch_or_exit("MyApp", true)?;
//! // Only the primary instance gets here.
//! # Ok::<(), instance_relay::Error>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod election;
pub mod error;
pub mod identifier;
pub mod ipc;
pub mod traits;

pub use config::Config;
pub use coordinator::{
    check_and_launch, init, launch_or_exit, on_args_received, on_diagnostic, Coordinator, Role,
};
pub use error::{ChannelError, Error};
pub use identifier::AppId;
