//! Error types for nitro sessions.

use std::fmt;

/// Alias for `Result<T, nitro::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by link adapters and the session manager.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The hub closed the link normally. Not a fault.
    #[error("hub disconnected")]
    Disconnected,

    /// A link operation (open, install, write, run, close) failed.
    #[error("{op}: {message}")]
    Link {
        /// The operation that failed.
        op: &'static str,
        /// Detail reported by the transport.
        message: String,
    },

    /// A session is already connecting, active or tearing down.
    #[error("a session is already in progress")]
    Busy,

    /// The session manager has been stopped.
    #[error("session manager has stopped")]
    Stopped,

    /// A configuration file could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An I/O error outside any link operation.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds an [`Error::Link`] for operation `op`.
    pub fn link(op: &'static str, message: impl fmt::Display) -> Self {
        Self::Link {
            op,
            message: message.to_string(),
        }
    }

    /// Returns `true` when the error is a normal remote-initiated disconnect.
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnect_is_benign() {
        assert!(Error::Disconnected.is_benign());
        assert!(!Error::link("write", "hub disconnected").is_benign());
        assert!(!Error::Busy.is_benign());
    }

    #[test]
    fn link_error_names_the_operation() {
        let e = Error::link("open", "timed out");
        assert_eq!(e.to_string(), "open: timed out");
    }
}
