//! Routes the transport's diagnostic chatter into the host's subscriber.
//!
//! Connections and the cluster client log wire-level detail (dials,
//! handshakes, request/response pairs) through a [`TransportLogger`] instead
//! of the global default. The host picks the subscriber once at startup and
//! hands the logger down explicitly; nothing global is touched.

use std::fmt;

use tracing::{debug, Dispatch};

/// Value of the `component` field on every transport event.
pub const COMPONENT: &str = "kafka-transport";

/// Handle for emitting transport diagnostics as DEBUG events.
#[derive(Clone)]
pub struct TransportLogger {
    dispatch: Dispatch,
}

impl TransportLogger {
    /// Log into `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Log into whatever subscriber is the default for the calling thread.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }

    /// Discard every event.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    pub fn log(&self, args: fmt::Arguments<'_>) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            debug!(component = COMPONENT, "{}", args);
        });
    }
}

impl Default for TransportLogger {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Debug for TransportLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLogger").finish_non_exhaustive()
    }
}
