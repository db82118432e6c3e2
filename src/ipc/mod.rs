//! Local message channel between instances.
//!
//! The primary binds a Unix stream socket and accepts one connection at a
//! time ([`listener`]); every other launch connects, writes one message and
//! closes ([`client`]).
//!
//! # Wire format
//!
//! One message per connection: a JSON array of strings followed by `\n`,
//! after which the client shuts down its write half.
//!
//! ```json
//! ["--flag","value"]
//! ```

pub mod client;
pub mod listener;

use crate::error::ChannelError;
use crate::traits::{ArgsHandler, DiagnosticSink};
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Encode `args` as a single wire message.
pub fn encode_args(args: &[String]) -> Result<Vec<u8>, ChannelError> {
    let mut bytes = serde_json::to_vec(args)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a complete wire message.  Surrounding whitespace is accepted;
/// anything besides exactly one array of strings is an error.
pub fn decode_args(bytes: &[u8]) -> Result<Vec<String>, ChannelError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Callbacks shared between the coordinator and the listener thread.
///
/// Cloning is cheap and every clone sees later registrations, so a handler
/// can be registered before or after the listener starts.
#[derive(Clone, Default)]
pub struct Hooks {
    args: Arc<RwLock<Option<Arc<dyn ArgsHandler>>>>,
    diagnostic: Arc<RwLock<Option<Arc<dyn DiagnosticSink>>>>,
}

impl Hooks {
    /// Replace the arguments handler.
    pub fn set_args_handler(&self, handler: impl ArgsHandler) {
        *self.args.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handler));
    }

    /// Replace the diagnostic sink.
    pub fn set_diagnostic(&self, sink: impl DiagnosticSink) {
        *self.diagnostic.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(sink));
    }

    pub fn has_args_handler(&self) -> bool {
        self.args.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Hand `args` to the registered handler, catching panics.
    ///
    /// Returns `Ok(false)` when no handler is registered.
    pub(crate) fn dispatch(&self, args: Vec<String>) -> Result<bool, ChannelError> {
        let handler = self.args.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(handler) = handler else {
            return Ok(false);
        };
        panic::catch_unwind(AssertUnwindSafe(|| handler.on_args(args)))
            .map(|()| true)
            .map_err(|payload| ChannelError::HandlerPanicked(panic_message(&*payload)))
    }

    /// Log an absorbed error and forward it to the diagnostic sink.
    pub(crate) fn report(&self, context: &str, error: ChannelError) {
        warn!("{}: {}", context, error);
        let sink = self.diagnostic.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            if panic::catch_unwind(AssertUnwindSafe(|| sink.on_error(&error))).is_err() {
                warn!("diagnostic sink panicked");
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
