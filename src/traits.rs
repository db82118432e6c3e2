//! Callback seams between the message channel and the host application.
//!
//! The listener never knows what the application does with forwarded
//! arguments; it only hands them to an [`ArgsHandler`].  Transport errors
//! that the channel swallows are surfaced to an optional
//! [`DiagnosticSink`] so they can be observed without being propagated.
//!
//! Both traits are implemented for plain closures, so registering a
//! handler is usually just:
//!
//! ```ignore
//! coordinator.on_args_received(|args: Vec<String>| println!("{:?}", args));
//! ```

use crate::error::ChannelError;

/// Receives the argument list of each secondary launch.
///
/// # Contract
///
/// * Called on the listener thread, once per decoded message, in
///   connection-accept order.
/// * A panic inside the handler is caught; the listener keeps running.
pub trait ArgsHandler: Send + Sync + 'static {
    fn on_args(&self, args: Vec<String>);
}

impl<F> ArgsHandler for F
where
    F: Fn(Vec<String>) + Send + Sync + 'static,
{
    fn on_args(&self, args: Vec<String>) {
        self(args)
    }
}

/// Observes errors the channel absorbs (bad payloads, handler panics,
/// unreachable primary, …).
pub trait DiagnosticSink: Send + Sync + 'static {
    fn on_error(&self, error: &ChannelError);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&ChannelError) + Send + Sync + 'static,
{
    fn on_error(&self, error: &ChannelError) {
        self(error)
    }
}
