//! Process signals of the `nodelink` binary.
//!
//! * Ctrl-C and SIGTERM close all node sessions and exit.
//! * SIGHUP drops every node connection and lets it reconnect, which is handy
//!   after restarting a node by hand. Players survive when the node resumes
//!   the session.
//!
//! Only Ctrl-C is available on non-Unix platforms.
//!
//! # Example
//!
//! ```no_run
//! use nodelink::signal::{Handler, ShutdownSignal};
//!
//! async fn example() {
//!     let mut signals = Handler::new().unwrap();
//!     while signals.recv().await == ShutdownSignal::Reconnect {
//!         println!("reconnecting nodes");
//!     }
//! }
//! ```

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// A signal the binary acts on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[expect(clippy::module_name_repetitions)]
pub enum ShutdownSignal {
    /// Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Reconnect,
}

impl ShutdownSignal {
    /// Whether the process should exit.
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

/// Listens for [`ShutdownSignal`]s. Must be created within a Tokio runtime.
pub struct Handler {
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sighup: Signal,
}

impl Handler {
    /// Registers the signal listeners.
    ///
    /// # Errors
    ///
    /// Returns error if signal handlers cannot be registered.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sighup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Waits for the next signal.
    ///
    /// If Ctrl-C cannot be listened for, this reports an interrupt right
    /// away rather than leaving the process without a way to stop.
    pub async fn recv(&mut self) -> ShutdownSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("unable to listen for Ctrl-C: {e}");
                    }
                    ShutdownSignal::Interrupt
                }
                _ = self.sigterm.recv() => ShutdownSignal::Terminate,
                _ = self.sighup.recv() => ShutdownSignal::Reconnect,
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("unable to listen for Ctrl-C: {e}");
            }
            ShutdownSignal::Interrupt
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "Ctrl+C"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Reconnect => write!(f, "SIGHUP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hangup_keeps_running() {
        assert!(ShutdownSignal::Interrupt.is_shutdown());
        assert!(ShutdownSignal::Terminate.is_shutdown());
        assert!(!ShutdownSignal::Reconnect.is_shutdown());
        assert_eq!(ShutdownSignal::Reconnect.to_string(), "SIGHUP");
    }
}
