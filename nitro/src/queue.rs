//! Inbound command queue from the control surface to the session worker.
//!
//! Producers enqueue without blocking; only the worker dequeues. Commands
//! carry the generation of the session they were accepted for, so input
//! that races a teardown can never replay into the next session.

use std::sync::Arc;

use nitro_proto::DriveCommand;
use tokio::sync::mpsc;

use crate::SessionState;
use crate::state::Shared;

/// A command tagged with the session generation that accepted it.
type Tagged = (u64, DriveCommand);

/// Cloneable producer handle given to input sources.
#[derive(Debug, Clone)]
pub struct CommandSender {
    /// Unbounded inbound channel.
    tx: mpsc::UnboundedSender<Tagged>,
    /// Readiness flag and generation counter.
    shared: Arc<Shared>,
}

impl CommandSender {
    /// Queues `cmd` for the active session.
    ///
    /// Never blocks. Returns `false` and drops the command when no session
    /// is active, so stray input during connect or teardown is discarded.
    pub fn enqueue(&self, cmd: DriveCommand) -> bool {
        // One read: an Active state always comes with its own generation.
        let (state, generation) = self.shared.snapshot();
        if state != SessionState::Active {
            tracing::debug!(%cmd, "no active session, command dropped");
            return false;
        }
        self.tx.send((generation, cmd)).is_ok()
    }

    /// Returns `true` while a session is active.
    pub fn is_active(&self) -> bool {
        self.shared.state() == SessionState::Active
    }
}

/// Consumer side, owned by the session worker.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    /// Unbounded inbound channel.
    rx: mpsc::UnboundedReceiver<Tagged>,
    /// Readiness flag and generation counter.
    shared: Arc<Shared>,
}

impl CommandQueue {
    /// Waits for the next command of the current session, in FIFO order.
    ///
    /// Cancel-safe. Returns `None` once every sender is gone.
    pub(crate) async fn dequeue(&mut self) -> Option<DriveCommand> {
        loop {
            let (generation, cmd) = self.rx.recv().await?;
            if generation == self.shared.generation() {
                return Some(cmd);
            }
            tracing::debug!(%cmd, generation, "discarding command from an earlier session");
        }
    }

    /// Drops everything queued. Returns how many commands were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Creates a connected sender/queue pair.
pub(crate) fn channel(shared: Arc<Shared>) -> (CommandSender, CommandQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CommandSender {
            tx,
            shared: Arc::clone(&shared),
        },
        CommandQueue { rx, shared },
    )
}
