use std::thread;
use std::time::Instant;

use nitro_proto::{Tuning, listener_program};

use super::*;
use crate::testing::{Call, MockHandle, MockLink, Script};

/// Upper bound for any wait in these tests.
const DEADLINE: Duration = Duration::from_secs(5);

fn hub() -> DeviceDescriptor {
    DeviceDescriptor::new("AA:BB", "Truck")
}

/// A running manager over a [`MockLink`], plus everything it has reported.
struct Harness {
    manager: SessionManager,
    events: EventReceiver,
    states: broadcast::Receiver<SessionState>,
    link: MockLink,
    log: Vec<String>,
    history: Vec<SessionState>,
}

impl Harness {
    fn new(script: Script, mode: Mode) -> Self {
        Self::with_config(
            script,
            SessionConfig::default()
                .with_mode(mode)
                .with_settle(Duration::ZERO),
        )
    }

    fn with_config(script: Script, config: SessionConfig) -> Self {
        let link = MockLink::new(script);
        let config = config.with_teardown_timeout(Duration::from_millis(200));
        let (manager, events) = SessionManager::start(link.clone(), config).unwrap();
        let states = manager.subscribe();
        Self {
            manager,
            events,
            states,
            link,
            log: Vec::new(),
            history: Vec::new(),
        }
    }

    fn streaming() -> Self {
        Self::new(Script::default(), Mode::Streaming)
    }

    fn pump(&mut self) {
        self.log
            .extend(self.events.drain().into_iter().map(|e| e.message));
        while let Ok(state) = self.states.try_recv() {
            self.history.push(state);
        }
    }

    fn wait_until(&mut self, mut cond: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + DEADLINE;
        loop {
            self.pump();
            if cond(self) {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_for(&mut self, state: SessionState) -> bool {
        self.wait_until(|h| h.history.last() == Some(&state))
    }

    /// Waits until the session is idle and has said so.
    fn wait_idle(&mut self) -> bool {
        self.wait_until(|h| {
            h.history.last() == Some(&SessionState::Idle)
                && h.log.last().map(String::as_str) == Some("Disconnected.")
        })
    }

    fn connect_active(&mut self) {
        self.manager.connect(hub()).unwrap();
        assert!(self.wait_for(SessionState::Active), "never became active");
    }

    fn disconnect_idle(&mut self) {
        self.manager.disconnect();
        assert!(self.wait_idle(), "never returned to idle");
    }

    fn logged(&self, line: &str) -> usize {
        self.log.iter().filter(|l| *l == line).count()
    }

    fn position(&self, call: &Call) -> usize {
        self.link
            .calls()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{call:?} never happened"))
    }
}

#[test]
fn streaming_forwards_commands_in_enqueue_order() {
    let mut h = Harness::streaming();
    h.connect_active();

    for cmd in [
        DriveCommand::Forward,
        DriveCommand::Stop,
        DriveCommand::TurnLeft,
        DriveCommand::Center,
    ] {
        assert!(h.manager.enqueue(cmd));
    }
    assert!(h.wait_until(|h| h.link.written() == b"FSLC"));
    h.disconnect_idle();

    assert_eq!(h.link.written(), b"FSLCX");
    let calls = h.link.calls();
    assert_eq!(calls[0], Call::Open("AA:BB".to_owned()));
    assert!(matches!(&calls[1], Call::Install(p) if p.name == "listener"));
    assert_eq!(calls.last(), Some(&Call::Close));
    assert!(h.position(&Call::Cancel("listener".to_owned())) < h.position(&Call::Close));

    assert_eq!(
        h.history,
        [
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Disconnecting,
            SessionState::Idle
        ]
    );
    assert_eq!(h.logged("Action: ▲ Driving forward"), 1);
    assert_eq!(h.logged("Connection established"), 1);
}

#[test]
fn shutdown_precedes_close_even_when_close_fails() {
    let mut h = Harness::new(
        Script {
            fail_close: true,
            ..Script::default()
        },
        Mode::Streaming,
    );
    h.connect_active();
    h.disconnect_idle();

    assert!(h.position(&Call::Write(b"X".to_vec())) < h.position(&Call::Close));
    assert_eq!(h.manager.state(), SessionState::Idle);

    // Still connectable.
    h.connect_active();
    assert_eq!(h.link.count(|c| matches!(c, Call::Open(_))), 2);
}

#[test]
fn open_failure_goes_straight_to_teardown() {
    let mut h = Harness::new(
        Script {
            fail_open: true,
            ..Script::default()
        },
        Mode::Streaming,
    );
    assert!(h.manager.connect(hub()).is_ok());
    assert!(h.wait_idle());

    assert_eq!(
        h.history,
        [
            SessionState::Connecting,
            SessionState::Disconnecting,
            SessionState::Idle
        ]
    );
    assert_eq!(h.link.calls(), [Call::Open("AA:BB".to_owned())]);
    assert_eq!(
        h.log,
        [
            "Connecting to Truck...",
            "Link error: open: hub not found",
            "Disconnected.",
        ]
    );
}

#[test]
fn discrete_backward_runs_once_to_completion() {
    let mut h = Harness::new(
        Script {
            program_time: Duration::from_millis(10),
            ..Script::default()
        },
        Mode::Program,
    );
    h.connect_active();
    assert!(h.manager.enqueue(DriveCommand::Backward));
    assert!(h.wait_until(|h| h.logged("Executed: run_backward") == 1));
    h.disconnect_idle();

    assert_eq!(h.logged("Executed: run_backward"), 1);
    let calls = h.link.calls();
    let Call::Install(program) = &calls[1] else {
        panic!("expected an upload, got {:?}", calls[1]);
    };
    assert_eq!(program.name, "run_backward");
    assert!(program.source.contains("left.run(800)"));
    assert!(program.source.contains("wait(1000)"));
    assert_eq!(calls[2], Call::Wait("run_backward".to_owned()));

    // Teardown runs the shutdown program, then closes.
    assert!(matches!(&calls[3], Call::Install(p) if p.name == "run_shutdown"));
    assert_eq!(calls.last(), Some(&Call::Close));
    assert_eq!(h.link.count(|c| matches!(c, Call::Write(_))), 0);
}

#[test]
fn disconnect_interrupts_a_running_program() {
    let mut h = Harness::new(
        Script {
            programs_hang: true,
            ..Script::default()
        },
        Mode::Program,
    );
    h.connect_active();
    assert!(h.manager.enqueue(DriveCommand::Forward));
    assert!(h.wait_until(|h| h.link.calls().contains(&Call::Wait("run_forward".to_owned()))));

    let started = Instant::now();
    h.disconnect_idle();
    assert!(started.elapsed() < Duration::from_secs(2));

    let cancel = h.position(&Call::Cancel("run_forward".to_owned()));
    let shutdown = h
        .link
        .calls()
        .iter()
        .position(|c| matches!(c, Call::Install(p) if p.name == "run_shutdown"))
        .unwrap();
    assert!(cancel < shutdown);
    assert!(shutdown < h.position(&Call::Close));
    assert!(!h.log.iter().any(|l| l.starts_with("Executed")));
}

#[test]
fn remote_hang_up_is_not_an_error() {
    let mut h = Harness::new(
        Script {
            hang_up_at_write: Some(1),
            ..Script::default()
        },
        Mode::Streaming,
    );
    h.connect_active();
    h.manager.enqueue(DriveCommand::Forward);
    h.manager.enqueue(DriveCommand::Stop);
    assert!(h.wait_idle());

    assert_eq!(h.logged("Hub disconnected"), 1);
    assert!(!h.log.iter().any(|l| l.starts_with("Link error")));
    assert_eq!(h.link.written(), b"FSX");
    assert_eq!(h.link.calls().last(), Some(&Call::Close));
}

#[test]
fn repeated_disconnect_tears_down_once() {
    let mut h = Harness::streaming();
    h.connect_active();
    h.manager.disconnect();
    h.manager.disconnect();
    assert!(h.wait_idle());
    h.manager.disconnect();

    thread::sleep(Duration::from_millis(50));
    h.pump();
    assert_eq!(h.logged("Disconnected."), 1);
    assert_eq!(h.link.count(|c| *c == Call::Close), 1);
    assert_eq!(h.link.written(), b"X");
}

#[tokio::test]
async fn second_teardown_has_no_effect() {
    let link = MockLink::default();
    let shared = Arc::new(Shared::default());
    let (_control_tx, control) = mpsc::unbounded_channel();
    let (_commands, queue) = queue::channel(Arc::clone(&shared));
    let (events, mut event_rx) = relay::channel();
    let (states, mut state_rx) = broadcast::channel(8);
    let mut worker = Worker {
        link: link.clone(),
        codec: codec_for(Mode::Streaming, Tuning::default()),
        config: SessionConfig::default(),
        control,
        queue,
        events,
        shared: Arc::clone(&shared),
        states,
    };

    shared.swap(SessionState::Active);
    let mut attempt = Attempt::<MockLink>::new(hub());
    attempt.handle = Some(MockHandle::default());
    attempt.listener = Some("listener".to_owned());

    worker.teardown(&mut attempt).await;
    let first = link.calls();
    worker.teardown(&mut attempt).await;

    assert_eq!(link.calls(), first);
    assert_eq!(
        first,
        [
            Call::Write(b"X".to_vec()),
            Call::Cancel("listener".to_owned()),
            Call::Close
        ]
    );
    assert_eq!(event_rx.drain().len(), 1);
    assert_eq!(state_rx.try_recv().unwrap(), SessionState::Disconnecting);
    assert_eq!(state_rx.try_recv().unwrap(), SessionState::Idle);
    assert!(state_rx.try_recv().is_err());
    assert!(attempt.device.is_none());
}

#[test]
fn reconnect_starts_from_a_clean_slate() {
    let mut h = Harness::streaming();
    h.connect_active();
    h.manager.enqueue(DriveCommand::Forward);
    assert!(h.wait_until(|h| h.link.written() == b"F"));
    h.disconnect_idle();

    assert!(!h.manager.enqueue(DriveCommand::TurnRight));

    h.manager
        .connect(DeviceDescriptor::new("CC:DD", "Other"))
        .unwrap();
    assert!(h.wait_for(SessionState::Active));
    h.manager.enqueue(DriveCommand::TurnLeft);
    assert!(h.wait_until(|h| h.link.written() == b"FXL"));
    h.disconnect_idle();

    assert_eq!(h.link.written(), b"FXLX");
    let opens: Vec<_> = h
        .link
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Open(_)))
        .collect();
    assert_eq!(
        opens,
        [
            Call::Open("AA:BB".to_owned()),
            Call::Open("CC:DD".to_owned())
        ]
    );
    assert_eq!(h.logged("Connecting to Other..."), 1);
}

#[test]
fn connect_while_held_is_refused() {
    let mut h = Harness::streaming();
    h.manager.connect(hub()).unwrap();
    assert!(matches!(h.manager.connect(hub()), Err(Error::Busy)));
    assert!(h.wait_for(SessionState::Active));
    assert!(matches!(h.manager.connect(hub()), Err(Error::Busy)));

    h.disconnect_idle();
    assert!(h.manager.connect(hub()).is_ok());
}

#[test]
fn input_while_idle_is_dropped() {
    let h = Harness::streaming();
    let input = h.manager.commands();
    assert!(!input.is_active());
    assert!(!input.enqueue(DriveCommand::Forward));
    assert!(!h.manager.enqueue(DriveCommand::Turbo));

    thread::sleep(Duration::from_millis(20));
    assert!(h.link.calls().is_empty());
}

#[test]
fn stop_tears_down_an_active_session() {
    let mut h = Harness::streaming();
    h.connect_active();
    let Harness { manager, link, .. } = h;
    manager.stop();

    let calls = link.calls();
    assert!(calls.contains(&Call::Write(b"X".to_vec())));
    assert_eq!(calls.last(), Some(&Call::Close));
}

/// A streaming session held in its settle delay, long enough to interrupt.
fn settling() -> Harness {
    let mut h = Harness::with_config(
        Script::default(),
        SessionConfig::default().with_settle(Duration::from_secs(10)),
    );
    h.manager.connect(hub()).unwrap();
    assert!(h.wait_until(|h| h.link.count(|c| matches!(c, Call::Install(_))) == 1));
    h
}

fn connecting_teardown() -> Vec<Call> {
    vec![
        Call::Open("AA:BB".to_owned()),
        Call::Install(listener_program(&Tuning::default())),
        Call::Write(b"X".to_vec()),
        Call::Cancel("listener".to_owned()),
        Call::Close,
    ]
}

#[test]
fn disconnect_while_settling_returns_promptly() {
    let mut h = settling();
    let started = Instant::now();
    h.disconnect_idle();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(
        h.history,
        [
            SessionState::Connecting,
            SessionState::Disconnecting,
            SessionState::Idle
        ]
    );
    assert_eq!(h.link.calls(), connecting_teardown());
    assert_eq!(h.logged("Connection established"), 0);
    assert!(!h.manager.enqueue(DriveCommand::Forward));
}

#[test]
fn stop_while_settling_tears_down() {
    let h = settling();
    let Harness { manager, link, .. } = h;
    let started = Instant::now();
    manager.stop();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(link.calls(), connecting_teardown());
}

#[test]
fn shutdown_command_ends_the_session() {
    let mut h = Harness::streaming();
    h.connect_active();
    assert!(h.manager.enqueue(DriveCommand::Shutdown));
    assert!(h.wait_idle());

    // One `X`, and the listener has already exited on it.
    assert_eq!(h.link.written(), b"X");
    assert_eq!(
        h.link.calls(),
        [
            Call::Open("AA:BB".to_owned()),
            Call::Install(listener_program(&Tuning::default())),
            Call::Write(b"X".to_vec()),
            Call::Close
        ]
    );
    assert_eq!(
        h.history,
        [
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Disconnecting,
            SessionState::Idle
        ]
    );
    assert!(!h.manager.enqueue(DriveCommand::Forward));
}

#[test]
fn shutdown_program_is_not_run_twice() {
    let mut h = Harness::new(Script::default(), Mode::Program);
    h.connect_active();
    assert!(h.manager.enqueue(DriveCommand::Shutdown));
    assert!(h.wait_idle());

    assert_eq!(h.logged("Executed: run_shutdown"), 1);
    let calls = h.link.calls();
    assert_eq!(
        h.link
            .count(|c| matches!(c, Call::Install(p) if p.name == "run_shutdown")),
        1
    );
    assert_eq!(calls[2], Call::Wait("run_shutdown".to_owned()));
    assert_eq!(calls.last(), Some(&Call::Close));

    // The next session shuts down normally again.
    h.connect_active();
    h.disconnect_idle();
    assert_eq!(
        h.link
            .count(|c| matches!(c, Call::Install(p) if p.name == "run_shutdown")),
        2
    );
}
