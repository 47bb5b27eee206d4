//! Outbound event relay from the session worker to the caller's display loop.
//!
//! Sending never blocks and never fails the worker; the caller polls with
//! [`EventReceiver::try_recv`] or [`EventReceiver::drain`].

use std::fmt;
use std::time::SystemTime;

use tokio::sync::mpsc;

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Level {
    /// Normal progress.
    Info,
    /// Something degraded but the session continues.
    Warn,
    /// A failure that ended the session.
    Error,
}

/// A timestamped, human-readable status line.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LogEvent {
    /// When the event was emitted.
    pub at: SystemTime,
    /// Severity.
    pub level: Level,
    /// Status text.
    pub message: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Producer half, held by the session worker.
#[derive(Debug, Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<LogEvent>);

impl EventSender {
    /// Emits an informational line.
    pub(crate) fn info(&self, message: impl Into<String>) {
        self.emit(Level::Info, message.into());
    }

    /// Emits a warning line.
    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.emit(Level::Warn, message.into());
    }

    /// Emits an error line.
    pub(crate) fn error(&self, message: impl Into<String>) {
        self.emit(Level::Error, message.into());
    }

    /// Mirrors the line to `tracing` and queues it for the caller.
    fn emit(&self, level: Level, message: String) {
        match level {
            Level::Info => tracing::info!(target: "nitro::events", "{message}"),
            Level::Warn => tracing::warn!(target: "nitro::events", "{message}"),
            Level::Error => tracing::error!(target: "nitro::events", "{message}"),
        }
        // A caller that stopped polling must not stall the session.
        let _ = self.0.send(LogEvent {
            at: SystemTime::now(),
            level,
            message,
        });
    }
}

/// Consumer half, polled by the caller.
#[derive(Debug)]
pub struct EventReceiver(mpsc::UnboundedReceiver<LogEvent>);

impl EventReceiver {
    /// Returns the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.0.try_recv().ok()
    }

    /// Returns every event that is ready, oldest first.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Waits for the next event. Returns `None` once the session manager
    /// is gone and every event has been read.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.0.recv().await
    }
}

/// Creates a connected sender/receiver pair.
pub(crate) fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), EventReceiver(rx))
}
