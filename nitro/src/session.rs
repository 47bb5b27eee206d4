//! Session manager: owns one link to one hub at a time.
//!
//! [`SessionManager::start`] spawns a dedicated thread running a
//! current-thread tokio runtime. Every link operation, dequeue and write
//! happens on that one worker, so session-internal state needs no locks.
//! The caller talks to it through three things only: the command queue,
//! the event relay, and the readiness flag.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open + listener + settle──▶ Active
//!   ▲                    │                                     │
//!   └──── Disconnecting ◀┴──── disconnect / link error ────────┘
//! ```
//!
//! Every path into Disconnecting sends the shutdown unit (best-effort),
//! cancels any program still running, closes the link and clears the
//! queue before returning to Idle. A delivered `Shutdown` command ends the
//! session the same way, without sending the shutdown unit twice.

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nitro_proto::{Codec, DriveCommand, Mode, WireUnit, codec_for};
use tokio::sync::{broadcast, mpsc};

use crate::queue::{self, CommandQueue, CommandSender};
use crate::relay::{self, EventReceiver, EventSender};
use crate::state::Shared;
use crate::{DeviceDescriptor, Error, Link, Result, SessionConfig, SessionState};

/// Transitions retained for subscribers that fall behind.
const STATE_HISTORY: usize = 32;

/// Requests from the caller to the worker.
#[derive(Debug)]
enum Control {
    /// Open a session to this hub.
    Connect(DeviceDescriptor),
    /// End the current session.
    Disconnect,
    /// End the current session and stop the worker.
    Shutdown,
}

/// Why a session ended without a link error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The caller asked to disconnect.
    Requested,
    /// The manager is being stopped.
    Shutdown,
    /// A `Shutdown` command was delivered; the hub stopped every actuator.
    Halted,
}

/// Outcome of a suspension point that a control request may interrupt.
enum Step<T> {
    /// The operation finished.
    Done(T),
    /// A control request arrived first.
    Interrupted(Exit),
}

/// Handle to the session worker.
///
/// All methods are non-blocking except [`stop`](Self::stop). Dropping the
/// manager stops it.
#[derive(Debug)]
pub struct SessionManager {
    /// Control requests to the worker.
    control: mpsc::UnboundedSender<Control>,
    /// Producer side of the command queue.
    commands: CommandSender,
    /// Readiness flag.
    shared: Arc<Shared>,
    /// State transition feed.
    states: broadcast::Sender<SessionState>,
    /// Worker thread, `None` once joined.
    thread: Option<thread::JoinHandle<()>>,
}

impl SessionManager {
    /// Spawns the session worker for `link`.
    ///
    /// Returns the manager and the receiving end of the event relay, which
    /// the caller should poll from its own loop.
    pub fn start<L: Link>(link: L, config: SessionConfig) -> Result<(Self, EventReceiver)> {
        let shared = Arc::new(Shared::default());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (commands, queue) = queue::channel(Arc::clone(&shared));
        let (events, event_rx) = relay::channel();
        let (states, _) = broadcast::channel(STATE_HISTORY);

        let worker = Worker {
            link,
            codec: codec_for(config.mode, config.tuning.clone()),
            config,
            control: control_rx,
            queue,
            events,
            shared: Arc::clone(&shared),
            states: states.clone(),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread = thread::Builder::new()
            .name("nitro-session".to_owned())
            .spawn(move || runtime.block_on(worker.run()))?;

        Ok((
            Self {
                control: control_tx,
                commands,
                shared,
                states,
                thread: Some(thread),
            },
            event_rx,
        ))
    }

    /// Starts connecting to `device`.
    ///
    /// Returns immediately; progress is reported through the event relay
    /// and [`subscribe`](Self::subscribe). Fails with [`Error::Busy`] when
    /// a session is already held.
    pub fn connect(&self, device: DeviceDescriptor) -> Result<()> {
        if self.control.is_closed() {
            return Err(Error::Stopped);
        }
        if !self.shared.claim() {
            return Err(Error::Busy);
        }
        let _ = self.states.send(SessionState::Connecting);
        self.control
            .send(Control::Connect(device))
            .map_err(|_| Error::Stopped)
    }

    /// Requests the current session to end. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.state() != SessionState::Idle {
            let _ = self.control.send(Control::Disconnect);
        }
    }

    /// Queues a command for the active session. See [`CommandSender::enqueue`].
    pub fn enqueue(&self, cmd: DriveCommand) -> bool {
        self.commands.enqueue(cmd)
    }

    /// A cloneable producer handle for input sources.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Returns `true` while commands are accepted.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Subscribes to state transitions, delivered in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.states.subscribe()
    }

    /// Tears down any session and joins the worker thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Sends `Shutdown` and joins the worker, once.
    fn shutdown(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("session worker panicked");
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resources of one connect-to-disconnect attempt.
///
/// Lives only for the duration of [`Worker::session`]; teardown drains it.
struct Attempt<L: Link> {
    /// The hub this attempt targets.
    device: Option<DeviceDescriptor>,
    /// Open link, if `open` succeeded.
    handle: Option<L::Handle>,
    /// Resident listener (streaming mode).
    listener: Option<L::Program>,
    /// Discrete program currently executing.
    inflight: Option<L::Program>,
    /// The shutdown unit has already been delivered.
    halted: bool,
}

impl<L: Link> Attempt<L> {
    /// An attempt holding nothing yet.
    fn new(device: DeviceDescriptor) -> Self {
        Self {
            device: Some(device),
            handle: None,
            listener: None,
            inflight: None,
            halted: false,
        }
    }
}

/// The session execution context.
struct Worker<L: Link> {
    /// Transport primitives.
    link: L,
    /// Command encoding strategy.
    codec: Box<dyn Codec>,
    /// Timing settings.
    config: SessionConfig,
    /// Requests from the caller.
    control: mpsc::UnboundedReceiver<Control>,
    /// Inbound commands.
    queue: CommandQueue,
    /// Outbound status lines.
    events: EventSender,
    /// Readiness flag.
    shared: Arc<Shared>,
    /// State transition feed.
    states: broadcast::Sender<SessionState>,
}

impl<L: Link> Worker<L> {
    /// Serves control requests until shutdown.
    async fn run(mut self) {
        tracing::debug!(mode = %self.codec.mode(), "session worker started");
        while let Some(msg) = self.control.recv().await {
            match msg {
                Control::Connect(device) => {
                    if self.session(device).await == Some(Exit::Shutdown) {
                        break;
                    }
                }
                Control::Disconnect => tracing::debug!("disconnect while idle ignored"),
                Control::Shutdown => break,
            }
        }
        tracing::debug!("session worker stopped");
    }

    /// Runs one session to completion, always ending in Idle.
    async fn session(&mut self, device: DeviceDescriptor) -> Option<Exit> {
        self.transition(SessionState::Connecting);
        self.events
            .info(format!("Connecting to {}...", device.name()));

        let mut attempt = Attempt::<L>::new(device);
        let exit = match self.drive(&mut attempt).await {
            Ok(exit) => {
                tracing::info!(?exit, "session ended");
                Some(exit)
            }
            Err(e) if e.is_benign() => {
                self.events.info("Hub disconnected");
                None
            }
            Err(e) => {
                self.events.error(format!("Link error: {e}"));
                None
            }
        };
        self.teardown(&mut attempt).await;
        exit
    }

    /// Connecting and Active phases. Returns when the session should end.
    async fn drive(&mut self, attempt: &mut Attempt<L>) -> Result<Exit> {
        let Some(device) = attempt.device.as_ref() else {
            return Err(Error::link("open", "no device selected"));
        };
        let opened = match until_control(&mut self.control, self.link.open(device)).await? {
            Step::Done(h) => h,
            Step::Interrupted(exit) => return Ok(exit),
        };
        tracing::info!(device = %device, "link open");
        let handle = attempt.handle.insert(opened);

        if let Some(program) = self.codec.setup() {
            self.events.info("Loading listener program...");
            let install = self.link.install_program(handle, &program);
            match until_control(&mut self.control, install).await? {
                Step::Done(p) => attempt.listener = Some(p),
                Step::Interrupted(exit) => return Ok(exit),
            }
            let settle = self.config.settle_delay();
            let wait = async move {
                tokio::time::sleep(settle).await;
                Ok(())
            };
            if let Step::Interrupted(exit) = until_control(&mut self.control, wait).await? {
                return Ok(exit);
            }
        }

        self.shared.advance();
        self.transition(SessionState::Active);
        self.events.info("Connection established");

        loop {
            tokio::select! {
                biased;
                msg = self.control.recv() => {
                    if let Some(exit) = control_exit(msg) {
                        return Ok(exit);
                    }
                }
                cmd = self.queue.dequeue() => {
                    let Some(cmd) = cmd else {
                        return Ok(Exit::Shutdown);
                    };
                    if let Some(exit) = self.execute(cmd, attempt).await? {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    /// Encodes and delivers one command, waiting until it is sent (streaming)
    /// or has finished executing (discrete).
    async fn execute(&mut self, cmd: DriveCommand, attempt: &mut Attempt<L>) -> Result<Option<Exit>> {
        let Some(handle) = attempt.handle.as_mut() else {
            return Err(Error::link("write", "link is not open"));
        };
        tracing::debug!(%cmd, "executing");

        match self.codec.encode(cmd) {
            WireUnit::Token(token) => {
                self.events.info(format!("Action: {}", cmd.describe()));
                self.link.write(handle, &[token]).await?;
                if cmd == DriveCommand::Shutdown {
                    // The listener exits on this token.
                    attempt.listener = None;
                    attempt.halted = true;
                    return Ok(Some(Exit::Halted));
                }
                Ok(None)
            }
            WireUnit::Program(program) => {
                let install = self.link.install_program(handle, &program);
                let started = match until_control(&mut self.control, install).await? {
                    Step::Done(p) => p,
                    Step::Interrupted(exit) => return Ok(Some(exit)),
                };
                let running = attempt.inflight.insert(started);
                let wait = self.link.wait_program(handle, running);
                match until_control(&mut self.control, wait).await? {
                    Step::Done(()) => {
                        attempt.inflight = None;
                        self.events.info(format!("Executed: {}", program.name));
                        if cmd == DriveCommand::Shutdown {
                            attempt.halted = true;
                            return Ok(Some(Exit::Halted));
                        }
                        Ok(None)
                    }
                    // Left in flight for teardown to cancel.
                    Step::Interrupted(exit) => Ok(Some(exit)),
                }
            }
        }
    }

    /// Disconnecting phase. Safe to call more than once.
    async fn teardown(&mut self, attempt: &mut Attempt<L>) {
        if self.shared.state() == SessionState::Idle {
            return;
        }
        self.transition(SessionState::Disconnecting);

        let dropped = self.queue.clear();
        if dropped > 0 {
            self.events
                .warn(format!("Discarded {dropped} pending command(s)"));
        }

        let limit = self.config.teardown_limit();
        if let Some(mut handle) = attempt.handle.take() {
            // A discrete program still running would block the shutdown program.
            if self.codec.mode() == Mode::Program {
                if let Some(p) = attempt.inflight.take() {
                    best_effort("cancel program", limit, self.link.cancel_program(&mut handle, &p))
                        .await;
                }
            }

            match self.codec.encode(DriveCommand::Shutdown) {
                _ if attempt.halted => tracing::debug!("hub already shut down"),
                WireUnit::Token(token) => {
                    best_effort("send shutdown", limit, self.link.write(&mut handle, &[token]))
                        .await;
                }
                WireUnit::Program(program) => {
                    best_effort(
                        "run shutdown program",
                        limit,
                        self.link.run_program(&mut handle, &program),
                    )
                    .await;
                }
            }

            for p in [attempt.inflight.take(), attempt.listener.take()]
                .into_iter()
                .flatten()
            {
                best_effort("cancel program", limit, self.link.cancel_program(&mut handle, &p))
                    .await;
            }

            best_effort("close link", limit, self.link.close(handle)).await;
        }

        attempt.inflight = None;
        attempt.listener = None;
        attempt.device = None;
        attempt.halted = false;
        self.transition(SessionState::Idle);
        self.events.info("Disconnected.");
    }

    /// Moves to `next`, publishing the transition if it is a change.
    fn transition(&self, next: SessionState) {
        let prev = self.shared.swap(next);
        if prev != next {
            tracing::debug!(%prev, %next, "session state");
            let _ = self.states.send(next);
        }
    }
}

/// Maps a control message received mid-session to an exit, if it is one.
fn control_exit(msg: Option<Control>) -> Option<Exit> {
    match msg {
        Some(Control::Disconnect) => Some(Exit::Requested),
        Some(Control::Shutdown) | None => Some(Exit::Shutdown),
        Some(Control::Connect(device)) => {
            tracing::warn!(device = %device, "connect while a session is held ignored");
            None
        }
    }
}

/// Awaits `fut` unless a disconnect or shutdown request arrives first.
///
/// Dropping `fut` on interruption is how a blocking wait gets cancelled.
async fn until_control<T>(
    control: &mut mpsc::UnboundedReceiver<Control>,
    fut: impl Future<Output = Result<T>>,
) -> Result<Step<T>> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            msg = control.recv() => {
                if let Some(exit) = control_exit(msg) {
                    return Ok(Step::Interrupted(exit));
                }
            }
            out = &mut fut => return out.map(Step::Done),
        }
    }
}

/// Runs one cleanup step, bounded by `limit`. Failures are logged, never
/// propagated.
async fn best_effort(step: &'static str, limit: Duration, fut: impl Future<Output = Result<()>>) {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(())) => tracing::debug!(step, "cleanup step done"),
        Ok(Err(e)) if e.is_benign() => tracing::debug!(step, "hub already gone"),
        Ok(Err(e)) => tracing::warn!(step, error = %e, "cleanup step failed"),
        Err(_) => tracing::warn!(step, ?limit, "cleanup step timed out"),
    }
}

#[cfg(test)]
mod tests;
